use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("vector index has not been initialized")]
    NotInitialized,
    #[error("vector index is at capacity ({0} elements)")]
    CapacityExceeded(usize),
    #[error("descriptor dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("failed to persist index: {0}")]
    Persist(String),
    #[error("index state lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, IndexError>;
