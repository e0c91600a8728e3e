use serde::{Deserialize, Serialize};

/// Detector profile selected per-call: enroll always uses
/// `Register` (the high-precision detector), recognize normally uses
/// `Recognize` (the faster one); `Precise` is available to callers that want
/// enroll-grade accuracy on a recognize path (e.g. step-up auth).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectionMode {
    Register,
    Recognize,
    Precise,
}

/// A named bundle of recognition thresholds, modeled as a closed enum
/// rather than a duck-typed config dict.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecognitionProfile {
    HighSecurity,
    Balanced,
    Fast,
    Permissive,
}

impl RecognitionProfile {
    /// Euclidean-distance match cutoff for this profile.
    pub fn confidence_threshold(&self) -> f32 {
        match self {
            RecognitionProfile::HighSecurity => 0.25,
            RecognitionProfile::Balanced => 0.42,
            RecognitionProfile::Fast => 0.55,
            RecognitionProfile::Permissive => 0.65,
        }
    }
}

impl Default for RecognitionProfile {
    fn default() -> Self {
        RecognitionProfile::Balanced
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_match_spec_defaults() {
        assert_eq!(RecognitionProfile::HighSecurity.confidence_threshold(), 0.25);
        assert_eq!(RecognitionProfile::Balanced.confidence_threshold(), 0.42);
        assert_eq!(RecognitionProfile::Fast.confidence_threshold(), 0.55);
        assert_eq!(RecognitionProfile::Permissive.confidence_threshold(), 0.65);
    }
}
