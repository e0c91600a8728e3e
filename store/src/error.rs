use thiserror::Error;

/// Errors surfaced at the descriptor store's own seam, before
/// conversion into `facesrec_coordinator::CoordinatorError` at the coordinator boundary.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("external id {0} already enrolled among active users")]
    Duplicate(String),
    #[error("no user found for {0}")]
    NotFound(String),
    #[error("stored descriptor for user {0} is malformed: {1}")]
    MalformedDescriptor(u64, String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
