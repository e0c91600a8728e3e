use facesrec_types::RecognitionProfile;
use std::time::Duration;

/// Coordinator configuration. `default_profile` is the one field meant to
/// change hot at runtime — it lives behind the coordinator's own
/// `parking_lot::RwLock`, not in this plain struct.
#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    pub default_profile: RecognitionProfile,
    pub min_face_size: u32,
    pub max_face_size: u32,
    /// Minimum `detection_score` accepted on enroll, default 0.8.
    pub detection_confidence: f32,
    pub cache_enabled: bool,
    /// `CONFIDENCE_THRESHOLD`: overrides `default_profile`'s own cutoff when
    /// an operator wants a numeric tweak without switching to a different
    /// named profile. A per-call `IdentifyOptions::profile` still wins over
    /// both of these.
    pub confidence_threshold: Option<f32>,
    /// Per-embedding-operation timeout (spec §5/§7, default 10 s). A detect+
    /// embed call that runs longer than this surfaces as
    /// `CoordinatorError::Timeout` rather than blocking the caller
    /// indefinitely on a hung detector.
    pub embed_timeout: Duration,
}

impl CoordinatorConfig {
    pub fn effective_threshold(&self, active_profile: RecognitionProfile) -> f32 {
        self.confidence_threshold.unwrap_or_else(|| active_profile.confidence_threshold())
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            default_profile: RecognitionProfile::Balanced,
            min_face_size: 80,
            max_face_size: 3000,
            detection_confidence: 0.8,
            cache_enabled: true,
            confidence_threshold: None,
            embed_timeout: Duration::from_secs(10),
        }
    }
}
