use clap::Args;
use std::time::Duration;

/// Top-level process configuration, flattened from one `#[clap(flatten)]`
/// struct per component. Every recognized configuration option is one
/// field here with its documented default.
#[derive(Args, Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    #[arg(long, env = "HOST", default_value_t = String::from("0.0.0.0"))]
    pub host: String,

    /// Port the HTTP listener binds to.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Log level passed to `tracing_subscriber::EnvFilter` if `RUST_LOG` is unset.
    #[arg(long, env = "LOG_LEVEL", default_value_t = String::from("info"))]
    pub log_level: String,

    /// Directory the HNSW graph dump and JSON metadata sidecar live in.
    #[arg(long, env = "INDEX_DIR", default_value_t = String::from("./data/index"))]
    pub index_dir: String,

    /// Postgres connection string backing the descriptor store.
    #[arg(long, env = "DATABASE_URL", default_value_t = String::from("postgres://localhost/facesrec"))]
    pub database_url: String,

    /// Redis connection string for the distributed result cache. Falls back
    /// to the in-process cache automatically if unreachable.
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    #[clap(flatten)]
    pub recognition: RecognitionConfig,

    #[clap(flatten)]
    pub index: IndexTuningConfig,

    #[clap(flatten)]
    pub cache: CacheTuningConfig,

    #[clap(flatten)]
    pub batch: BatchTuningConfig,
}

#[derive(Args, Debug, Clone)]
pub struct RecognitionConfig {
    /// Match cutoff in Euclidean distance.
    #[arg(long, env = "CONFIDENCE_THRESHOLD", default_value_t = 0.42)]
    pub confidence_threshold: f32,
    /// Accepted face box pixel range, lower bound.
    #[arg(long, env = "MIN_FACE_SIZE", default_value_t = 80)]
    pub min_face_size: u32,
    /// Accepted face box pixel range, upper bound.
    #[arg(long, env = "MAX_FACE_SIZE", default_value_t = 3000)]
    pub max_face_size: u32,
}

#[derive(Args, Debug, Clone)]
pub struct IndexTuningConfig {
    #[arg(long, env = "HNSW_M", default_value_t = 16)]
    pub hnsw_m: usize,
    #[arg(long, env = "HNSW_EF_CONSTRUCTION", default_value_t = 200)]
    pub hnsw_ef_construction: usize,
    #[arg(long, env = "HNSW_EF_SEARCH", default_value_t = 100)]
    pub hnsw_ef_search: usize,
    #[arg(long, env = "MAX_ELEMENTS", default_value_t = 1_100_000)]
    pub max_elements: usize,
}

#[derive(Args, Debug, Clone)]
pub struct CacheTuningConfig {
    /// Cache entry TTL in seconds.
    #[arg(long, env = "CACHE_TTL", default_value_t = 1800)]
    pub cache_ttl_secs: u64,
    /// In-process fallback cache capacity, entry count.
    #[arg(long, env = "CACHE_MAX_SIZE", default_value_t = 10_000)]
    pub cache_max_size: usize,
}

#[derive(Args, Debug, Clone)]
pub struct BatchTuningConfig {
    #[arg(long, env = "MAX_BATCH_SIZE", default_value_t = 50)]
    pub max_batch_size: usize,
    #[arg(long, env = "MAX_CONCURRENCY", default_value_t = 4)]
    pub max_concurrency: usize,
    /// Terminal-job retention, in milliseconds.
    #[arg(long, env = "JOB_TTL_MS", default_value_t = 3_600_000)]
    pub job_ttl_ms: u64,
}

impl CacheTuningConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl BatchTuningConfig {
    pub fn job_ttl(&self) -> Duration {
        Duration::from_millis(self.job_ttl_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::from("0.0.0.0"),
            port: 8080,
            log_level: String::from("info"),
            index_dir: String::from("./data/index"),
            database_url: String::from("postgres://localhost/facesrec"),
            redis_url: None,
            recognition: RecognitionConfig {
                confidence_threshold: 0.42,
                min_face_size: 80,
                max_face_size: 3000,
            },
            index: IndexTuningConfig {
                hnsw_m: 16,
                hnsw_ef_construction: 200,
                hnsw_ef_search: 100,
                max_elements: 1_100_000,
            },
            cache: CacheTuningConfig {
                cache_ttl_secs: 1800,
                cache_max_size: 10_000,
            },
            batch: BatchTuningConfig {
                max_batch_size: 50,
                max_concurrency: 4,
                job_ttl_ms: 3_600_000,
            },
        }
    }
}
