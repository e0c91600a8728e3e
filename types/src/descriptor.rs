//! Identifier and descriptor newtypes.
//!
//! `UserId` and `Label` wrap `u64` (the descriptor store's primary key and the
//! vector index's internal point id, respectively — never the same number).
//! `JobId` wraps a `Uuid`.
//! `Descriptor` wraps a fixed-size `[f32; 128]` rather than a bare `Vec<f32>`
//! so a dimension mismatch is a type error at construction time, not a panic
//! three layers down in the index.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub const DESCRIPTOR_DIM: usize = 128;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Label(pub u64);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A 128-dimensional face embedding. Euclidean (L2) distance is the only
/// metric the core ever computes over it; no normalization is assumed.
#[derive(Clone, Copy, Serialize, Deserialize)]
pub struct Descriptor(pub [f32; DESCRIPTOR_DIM]);

impl Descriptor {
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Euclidean distance between two descriptors.
    pub fn distance(&self, other: &Descriptor) -> f32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt()
    }

    pub fn from_vec(values: Vec<f32>) -> Result<Self, DescriptorParseError> {
        if values.len() != DESCRIPTOR_DIM {
            return Err(DescriptorParseError::WrongDimension(values.len()));
        }
        let mut arr = [0f32; DESCRIPTOR_DIM];
        arr.copy_from_slice(&values);
        Ok(Self(arr))
    }

    /// Parses the `users.descriptor` JSON array column.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, DescriptorParseError> {
        let values: Vec<f32> = serde_json::from_value(value.clone())
            .map_err(|e| DescriptorParseError::Malformed(e.to_string()))?;
        Self::from_vec(values)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.0
                .iter()
                .map(|v| serde_json::Number::from_f64(*v as f64).map(serde_json::Value::Number))
                .map(|n| n.unwrap_or(serde_json::Value::Null))
                .collect(),
        )
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Descriptor(128 floats, first={:?})", self.0.first())
    }
}

impl PartialEq for Descriptor {
    fn eq(&self, other: &Self) -> bool {
        self.0.iter().zip(other.0.iter()).all(|(a, b)| a == b)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DescriptorParseError {
    #[error("expected {DESCRIPTOR_DIM} floats, got {0}")]
    WrongDimension(usize),
    #[error("malformed descriptor JSON: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_self_is_zero() {
        let d = Descriptor([0.3f32; DESCRIPTOR_DIM]);
        assert_eq!(d.distance(&d), 0.0);
    }

    #[test]
    fn from_vec_rejects_wrong_dimension() {
        let err = Descriptor::from_vec(vec![0.0; 64]).unwrap_err();
        assert_eq!(err, DescriptorParseError::WrongDimension(64));
    }

    #[test]
    fn json_roundtrip() {
        let mut values = [0f32; DESCRIPTOR_DIM];
        for (i, v) in values.iter_mut().enumerate() {
            *v = i as f32 * 0.01;
        }
        let d = Descriptor(values);
        let json = d.to_json();
        let back = Descriptor::from_json(&json).unwrap();
        assert_eq!(d, back);
    }
}
