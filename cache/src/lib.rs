//! Two-tier result cache: a Redis-compatible distributed
//! primary, falling back transparently to an in-process map.

mod error;
mod key;
mod memory;

pub use key::cache_key;

use memory::MemoryCache;
use redis::AsyncCommands;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;

#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub redis_url: Option<String>,
    pub default_ttl: Duration,
    pub max_keys: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            default_ttl: Duration::from_secs(1800),
            max_keys: 10_000,
        }
    }
}

/// Connect timeout applied to every attempt in `FaceCache::connect`'s retry
/// loop (spec §5: "5 s connect"). Without it, a black-holed host never
/// becomes a hard failure and the backoff/fallback path is never reached.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Which tier is currently serving traffic. Set once at startup (or on the
/// first hard Redis failure) and never automatically swapped back — spec
/// §4.D: "reconnection does not automatically swap back mid-run".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheMode {
    Redis,
    Memory,
}

pub struct FaceCache {
    redis: Option<AsyncMutex<redis::aio::MultiplexedConnection>>,
    memory: MemoryCache,
    using_redis: AtomicBool,
    default_ttl: Duration,
}

impl FaceCache {
    /// "Selection": attempt to connect with a capped retry
    /// strategy (`min(attempt * 200ms, 1000ms)`, up to 3 attempts); on any
    /// hard failure or no URL configured, initialize the in-process
    /// fallback only.
    pub async fn connect(config: CacheConfig) -> Arc<Self> {
        let memory = MemoryCache::new(config.max_keys);

        let Some(url) = config.redis_url.as_deref() else {
            tracing::info!("no cache URL configured, using in-process fallback");
            return Arc::new(Self {
                redis: None,
                memory,
                using_redis: AtomicBool::new(false),
                default_ttl: config.default_ttl,
            });
        };

        for attempt in 1..=3u32 {
            match Self::try_connect(url).await {
                Ok(conn) => {
                    tracing::info!(attempt, "connected to distributed cache");
                    return Arc::new(Self {
                        redis: Some(AsyncMutex::new(conn)),
                        memory,
                        using_redis: AtomicBool::new(true),
                        default_ttl: config.default_ttl,
                    });
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "distributed cache connection attempt failed");
                    let backoff = Duration::from_millis((attempt as u64 * 200).min(1000));
                    tokio::time::sleep(backoff).await;
                }
            }
        }

        tracing::error!("exhausted connection attempts, falling back to in-process cache");
        Arc::new(Self {
            redis: None,
            memory,
            using_redis: AtomicBool::new(false),
            default_ttl: config.default_ttl,
        })
    }

    async fn try_connect(url: &str) -> redis::RedisResult<redis::aio::MultiplexedConnection> {
        let client = redis::Client::open(url)?;
        match tokio::time::timeout(CONNECT_TIMEOUT, client.get_multiplexed_async_connection()).await {
            Ok(result) => result,
            Err(_) => Err(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "connect attempt timed out",
            ))),
        }
    }

    pub fn mode(&self) -> CacheMode {
        if self.using_redis.load(Ordering::SeqCst) {
            CacheMode::Redis
        } else {
            CacheMode::Memory
        }
    }

    fn failover(&self, error: &redis::RedisError) {
        if self.using_redis.swap(false, Ordering::SeqCst) {
            tracing::error!(error = %error, "distributed cache connection lost, failing over to in-process cache");
        }
    }

    /// `get`. Swallows every error, returning `None`.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        if self.using_redis.load(Ordering::SeqCst) {
            if let Some(conn) = &self.redis {
                let mut conn = conn.lock().await;
                match conn.get::<_, Option<Vec<u8>>>(key).await {
                    Ok(v) => return v,
                    Err(e) => {
                        self.failover(&e);
                    }
                }
            }
        }
        self.memory.get(key)
    }

    /// `set`. `ttl` defaults to the configured default (1800s).
    #[tracing::instrument(skip(self, value))]
    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        if self.using_redis.load(Ordering::SeqCst) {
            if let Some(conn) = &self.redis {
                let mut conn = conn.lock().await;
                let result: redis::RedisResult<()> =
                    conn.set_ex(key, value.clone(), ttl.as_secs().max(1)).await;
                if let Err(e) = result {
                    self.failover(&e);
                } else {
                    return;
                }
            }
        }
        self.memory.set(key.to_string(), value, ttl);
    }

    /// `del`.
    #[tracing::instrument(skip(self))]
    pub async fn del(&self, key: &str) {
        if self.using_redis.load(Ordering::SeqCst) {
            if let Some(conn) = &self.redis {
                let mut conn = conn.lock().await;
                let result: redis::RedisResult<()> = conn.del(key).await;
                if let Err(e) = result {
                    self.failover(&e);
                } else {
                    return;
                }
            }
        }
        self.memory.del(key);
    }

    /// `invalidatePattern`: only meaningful on the distributed
    /// tier (`KEYS` + `DEL`); a no-op on the in-process fallback.
    #[tracing::instrument(skip(self))]
    pub async fn invalidate_pattern(&self, glob: &str) {
        if !self.using_redis.load(Ordering::SeqCst) {
            return;
        }
        let Some(conn) = &self.redis else { return };
        let mut conn = conn.lock().await;
        let keys: redis::RedisResult<Vec<String>> = conn.keys(glob).await;
        match keys {
            Ok(keys) if !keys.is_empty() => {
                let result: redis::RedisResult<()> = conn.del(keys).await;
                if let Err(e) = result {
                    self.failover(&e);
                }
            }
            Ok(_) => {}
            Err(e) => self.failover(&e),
        }
    }

    /// `flush`.
    #[tracing::instrument(skip(self))]
    pub async fn flush(&self) {
        if self.using_redis.load(Ordering::SeqCst) {
            if let Some(conn) = &self.redis {
                let mut conn = conn.lock().await;
                let result: redis::RedisResult<()> = redis::cmd("FLUSHDB").query_async(&mut *conn).await;
                if let Err(e) = result {
                    self.failover(&e);
                }
            }
        }
        self.memory.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_only_cache_roundtrips() {
        let cache = FaceCache::connect(CacheConfig {
            redis_url: None,
            default_ttl: Duration::from_secs(60),
            max_keys: 10,
        })
        .await;
        assert_eq!(cache.mode(), CacheMode::Memory);

        let key = cache_key(b"some image bytes");
        assert!(cache.get(&key).await.is_none());
        cache.set(&key, b"result".to_vec(), None).await;
        assert_eq!(cache.get(&key).await, Some(b"result".to_vec()));

        cache.del(&key).await;
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn unreachable_redis_url_falls_back_to_memory() {
        let cache = FaceCache::connect(CacheConfig {
            redis_url: Some("redis://127.0.0.1:1".into()),
            default_ttl: Duration::from_secs(60),
            max_keys: 10,
        })
        .await;
        assert_eq!(cache.mode(), CacheMode::Memory);
    }
}
