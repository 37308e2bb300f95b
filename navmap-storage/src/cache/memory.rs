//! Process-local cache backend.
//!
//! Expiry uses `tokio::time::Instant`, so tests running on a paused clock can
//! advance past a ttl without sleeping.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use navmap_core::{CacheError, CacheResult};
use tokio::time::Instant;

use super::keys::CacheKey;
use super::traits::{check_ttl, BatchOutcome, CacheBackend, CacheBatch, CacheOp};

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-memory cache with per-key expiry.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a live entry exists for `key`.
    pub fn contains(&self, key: &CacheKey) -> bool {
        let now = Instant::now();
        self.entries
            .read()
            .map(|e| e.get(key.as_str()).is_some_and(|entry| entry.is_live(now)))
            .unwrap_or(false)
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> CacheResult<usize> {
        let now = Instant::now();
        let mut entries = self.entries.write().map_err(|_| CacheError::LockPoisoned)?;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        Ok(before - entries.len())
    }

    fn apply(entries: &mut HashMap<String, Entry>, op: CacheOp, now: Instant) -> CacheResult<()> {
        match op {
            CacheOp::Set { key, value, ttl } => {
                check_ttl(ttl)?;
                entries.insert(
                    key.as_str().to_string(),
                    Entry {
                        value,
                        expires_at: now + ttl,
                    },
                );
            }
            CacheOp::Delete { key } => {
                entries.remove(key.as_str());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &CacheKey) -> CacheResult<Option<Vec<u8>>> {
        let now = Instant::now();
        let expired = {
            let entries = self.entries.read().map_err(|_| CacheError::LockPoisoned)?;
            match entries.get(key.as_str()) {
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => true,
                None => false,
            }
        };

        if expired {
            let mut entries = self.entries.write().map_err(|_| CacheError::LockPoisoned)?;
            // Re-check: a concurrent set may have refreshed the key.
            if entries
                .get(key.as_str())
                .is_some_and(|entry| !entry.is_live(now))
            {
                entries.remove(key.as_str());
            }
        }
        Ok(None)
    }

    async fn set(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        let mut entries = self.entries.write().map_err(|_| CacheError::LockPoisoned)?;
        Self::apply(
            &mut entries,
            CacheOp::Set {
                key: key.clone(),
                value,
                ttl,
            },
            Instant::now(),
        )
    }

    async fn delete(&self, key: &CacheKey) -> CacheResult<()> {
        let mut entries = self.entries.write().map_err(|_| CacheError::LockPoisoned)?;
        entries.remove(key.as_str());
        Ok(())
    }

    async fn execute(&self, batch: CacheBatch) -> CacheResult<BatchOutcome> {
        let now = Instant::now();
        let mut entries = self.entries.write().map_err(|_| CacheError::LockPoisoned)?;
        let mut outcome = BatchOutcome::default();
        for op in batch.into_ops() {
            let key = op.key().clone();
            match Self::apply(&mut entries, op, now) {
                Ok(()) => outcome.applied += 1,
                Err(e) => outcome.failures.push((key, e)),
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use navmap_core::{BeaconId, MapId};

    fn key() -> CacheKey {
        CacheKey::primary(&MapId::now_v7())
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = InMemoryCache::new();
        let key = key();

        assert_eq!(cache.get(&key).await.unwrap(), None);
        cache
            .set(&key, b"value".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), Some(b"value".to_vec()));

        cache.delete(&key).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), None);
        // Deleting again is fine.
        cache.delete(&key).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = InMemoryCache::new();
        let key = key();
        cache
            .set(&key, b"value".to_vec(), Duration::from_secs(1))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(cache.contains(&key));

        tokio::time::advance(Duration::from_millis(1500)).await;
        assert_eq!(cache.get(&key).await.unwrap(), None);
        assert!(cache.is_empty(), "expired entry is removed on read");
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired_keeps_live_entries() {
        let cache = InMemoryCache::new();
        let short = key();
        let long = key();
        cache
            .set(&short, b"s".to_vec(), Duration::from_secs(1))
            .await
            .unwrap();
        cache
            .set(&long, b"l".to_vec(), Duration::from_secs(10))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.purge_expired().unwrap(), 1);
        assert!(cache.contains(&long));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_zero_ttl_rejected() {
        let cache = InMemoryCache::new();
        let err = cache
            .set(&key(), b"v".to_vec(), Duration::ZERO)
            .await
            .expect_err("zero ttl");
        assert!(matches!(err, CacheError::Backend { .. }));
    }

    #[tokio::test]
    async fn test_execute_mixes_sets_and_deletes() {
        let cache = InMemoryCache::new();
        let primary = key();
        let beacon = CacheKey::beacon(&BeaconId::new("b-1"));
        cache
            .set(&beacon, b"old".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        let mut batch = CacheBatch::new();
        batch
            .set(primary.clone(), b"doc".to_vec(), Duration::from_secs(60))
            .delete(beacon.clone())
            .set(key(), b"never".to_vec(), Duration::ZERO);

        let outcome = cache.execute(batch).await.unwrap();
        assert_eq!(outcome.applied, 2);
        assert_eq!(outcome.failures.len(), 1);
        assert!(cache.contains(&primary));
        assert!(!cache.contains(&beacon));
    }
}
