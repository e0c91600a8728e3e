use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("batch must contain between 1 and {max} items, got {len}")]
    InvalidBatchSize { len: usize, max: usize },
    #[error("job {0} not found")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, BatchError>;
