use std::time::Duration;

/// Batch engine configuration: `MAX_BATCH_SIZE` / `MAX_CONCURRENCY` /
/// `JOB_TTL_MS`.
#[derive(Clone, Copy, Debug)]
pub struct BatchConfig {
    pub max_batch_size: usize,
    pub max_concurrency: usize,
    pub job_ttl: Duration,
    /// How often the eviction sweep runs, default 15 minutes.
    pub eviction_interval: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 50,
            max_concurrency: 4,
            job_ttl: Duration::from_secs(3_600),
            eviction_interval: Duration::from_secs(900),
        }
    }
}
