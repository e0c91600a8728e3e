use thiserror::Error;

/// Errors surfaced at the embedder adapter's own seam, before
/// conversion into `facesrec_coordinator::CoordinatorError` at the coordinator boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbedderError {
    #[error("image could not be decoded or is outside the accepted {min}..={max} pixel range: {detail}")]
    InvalidImage { detail: String, min: u32, max: u32 },
    #[error("embedder operation timed out")]
    Timeout,
    #[error("model load timed out")]
    ModelLoadTimeout,
}

pub type Result<T> = std::result::Result<T, EmbedderError>;
