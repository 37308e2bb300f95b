//! Redis cache backend (feature `redis`).
//!
//! Shares one multiplexed [`ConnectionManager`] between tasks; the manager
//! reconnects on its own after the server drops the connection. Batches go
//! out as a single non-transactional pipeline.

use std::time::Duration;

use async_trait::async_trait;
use navmap_core::{CacheError, CacheResult};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::keys::CacheKey;
use super::traits::{check_ttl, BatchOutcome, CacheBackend, CacheBatch, CacheOp};

/// Redis connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisCacheConfig {
    /// e.g. `redis://127.0.0.1:6379/0`
    pub url: String,
}

impl Default for RedisCacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/0".to_string(),
        }
    }
}

impl RedisCacheConfig {
    /// Reads `NAVMAP_REDIS_URL`.
    pub fn from_env() -> Self {
        std::env::var("NAVMAP_REDIS_URL")
            .map(|url| Self { url })
            .unwrap_or_default()
    }
}

fn redis_err(e: redis::RedisError) -> CacheError {
    if e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout() {
        CacheError::Connection {
            reason: e.to_string(),
        }
    } else {
        CacheError::Backend {
            reason: e.to_string(),
        }
    }
}

fn ttl_millis(ttl: Duration) -> CacheResult<u64> {
    check_ttl(ttl)?;
    Ok(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1))
}

/// Redis-backed cache.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(config: &RedisCacheConfig) -> CacheResult<Self> {
        let client = redis::Client::open(config.url.as_str()).map_err(redis_err)?;
        let conn = ConnectionManager::new(client).await.map_err(redis_err)?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &CacheKey) -> CacheResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        conn.get(key.as_str()).await.map_err(redis_err)
    }

    async fn set(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        let millis = ttl_millis(ttl)?;
        let mut conn = self.conn.clone();
        conn.pset_ex::<_, _, ()>(key.as_str(), value, millis)
            .await
            .map_err(redis_err)
    }

    async fn delete(&self, key: &CacheKey) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key.as_str()).await.map_err(redis_err)
    }

    async fn execute(&self, batch: CacheBatch) -> CacheResult<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        let mut pipe = redis::pipe();
        let mut queued = 0usize;

        for op in batch.ops() {
            match op {
                CacheOp::Set { key, value, ttl } => match ttl_millis(*ttl) {
                    Ok(millis) => {
                        pipe.pset_ex(key.as_str(), value.as_slice(), millis).ignore();
                        queued += 1;
                    }
                    Err(e) => outcome.failures.push((key.clone(), e)),
                },
                CacheOp::Delete { key } => {
                    pipe.del(key.as_str()).ignore();
                    queued += 1;
                }
            }
        }

        if queued > 0 {
            let mut conn = self.conn.clone();
            let _: () = pipe.query_async(&mut conn).await.map_err(redis_err)?;
        }
        outcome.applied = queued;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_millis() {
        assert_eq!(ttl_millis(Duration::from_secs(2)).unwrap(), 2000);
        assert_eq!(ttl_millis(Duration::from_micros(10)).unwrap(), 1);
        assert!(ttl_millis(Duration::ZERO).is_err());
    }

    #[test]
    fn test_default_config_points_at_localhost() {
        assert!(RedisCacheConfig::default().url.starts_with("redis://127.0.0.1"));
    }
}
