use thiserror::Error;

/// Error kinds surfaced by the core. The coordinator is the only
/// component an external caller actually observes, so the lower-level
/// crates' narrower errors (`IndexError`, `StoreError`, `EmbedderError`)
/// convert into this one with `#[from]` at this boundary, rather than
/// one workspace-wide error type.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("image could not be decoded or is out of the accepted size range")]
    InvalidImage,
    #[error("no face detected in image")]
    NoFace,
    #[error("detected face is smaller than the minimum accepted size")]
    FaceTooSmall,
    #[error("detected face is larger than the maximum accepted size")]
    FaceTooLarge,
    #[error("detected face did not meet the minimum detection quality")]
    LowQuality,
    #[error("external id {0} already enrolled")]
    Duplicate(String),
    #[error("no user found for {0}")]
    NotFound(String),
    #[error("vector index is at capacity")]
    CapacityExceeded,
    #[error("vector index has not been initialized")]
    NotInitialized,
    #[error("operation timed out")]
    Timeout,
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<facesrec_embedder::EmbedderError> for CoordinatorError {
    fn from(e: facesrec_embedder::EmbedderError) -> Self {
        match e {
            facesrec_embedder::EmbedderError::InvalidImage { .. } => CoordinatorError::InvalidImage,
            facesrec_embedder::EmbedderError::Timeout => CoordinatorError::Timeout,
            facesrec_embedder::EmbedderError::ModelLoadTimeout => CoordinatorError::Timeout,
        }
    }
}

impl From<facesrec_store::StoreError> for CoordinatorError {
    fn from(e: facesrec_store::StoreError) -> Self {
        match e {
            facesrec_store::StoreError::Duplicate(id) => CoordinatorError::Duplicate(id),
            facesrec_store::StoreError::NotFound(id) => CoordinatorError::NotFound(id),
            other => CoordinatorError::Internal(other.to_string()),
        }
    }
}

impl From<facesrec_index::IndexError> for CoordinatorError {
    fn from(e: facesrec_index::IndexError) -> Self {
        match e {
            facesrec_index::IndexError::NotInitialized => CoordinatorError::NotInitialized,
            facesrec_index::IndexError::CapacityExceeded(_) => CoordinatorError::CapacityExceeded,
            other => CoordinatorError::Internal(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
