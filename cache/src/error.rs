use thiserror::Error;

/// Internal only — every public `FaceCache` operation swallows this and
/// returns `None`/`false` instead.
#[derive(Error, Debug)]
pub(crate) enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}
