use crate::descriptor::{Descriptor, Label, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A detected face's bounding box, in pixel coordinates of the source image.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// Row of the `users` table. `externalId` is globally unique
/// among active users; `descriptor` is immutable within a row — "update
/// descriptor" replaces the whole row atomically rather than mutating in
/// place.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub user_id: UserId,
    pub external_id: String,
    pub display_name: String,
    pub client_ref: String,
    pub descriptor: Descriptor,
    pub confidence: f32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_recognition_at: Option<DateTime<Utc>>,
    pub recognition_count: u64,
}

/// The vector index's own bookkeeping row: `label` is the
/// index-local identifier, `label -> user_id` a bijection over live labels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub label: Label,
    pub user_id: UserId,
    pub external_id: String,
    pub display_name: String,
    pub client_ref: String,
}
