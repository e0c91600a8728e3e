use serde::{Deserialize, Serialize};

/// A single search/identify hit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub user_id: crate::descriptor::UserId,
    pub external_id: String,
    pub display_name: String,
    pub client_ref: String,
    /// Euclidean distance, never squared — see DESIGN.md's resolution of
    /// "squared internally, Euclidean externally" open question.
    pub distance: f32,
    /// `round((1 - distance) * 100)` as an integer percentage.
    pub similarity: i32,
}

/// The outcome of `Coordinator::identify`, cached verbatim so a
/// second identical query can be answered from the result cache without
/// re-running search.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdentifyOutcome {
    pub r#match: Option<Match>,
    pub processing_ms: u64,
    pub backend: Backend,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Backend {
    Ann,
    LinearFallback,
}

/// What the result cache actually stores under `face_recog_<md5>`. Kept
/// distinct from `IdentifyOutcome` because a cache hit never carries a fresh
/// `processing_ms`/`backend` — those are recomputed by the caller from the
/// cache lookup itself.
pub type CachedResult = IdentifyOutcome;
