//! Cache backend trait and pipelined batches.
//!
//! A backend is a plain byte store with per-key expiry. It knows nothing about
//! documents or indirection; the repository builds keys and values.

use std::time::Duration;

use async_trait::async_trait;
use navmap_core::{CacheError, CacheResult};

use super::keys::CacheKey;

/// One write inside a [`CacheBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOp {
    Set {
        key: CacheKey,
        value: Vec<u8>,
        ttl: Duration,
    },
    Delete {
        key: CacheKey,
    },
}

impl CacheOp {
    pub fn key(&self) -> &CacheKey {
        match self {
            CacheOp::Set { key, .. } | CacheOp::Delete { key } => key,
        }
    }
}

/// Writes submitted together.
///
/// Ops are applied in order, so a later set of the same key wins. There is no
/// rollback: a backend may apply some ops and fail others.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheBatch {
    ops: Vec<CacheOp>,
}

impl CacheBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: CacheKey, value: Vec<u8>, ttl: Duration) -> &mut Self {
        self.ops.push(CacheOp::Set { key, value, ttl });
        self
    }

    pub fn delete(&mut self, key: CacheKey) -> &mut Self {
        self.ops.push(CacheOp::Delete { key });
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[CacheOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<CacheOp> {
        self.ops
    }
}

/// Result of executing a batch that reached the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Number of ops applied.
    pub applied: usize,
    /// Ops that failed individually, with the reason.
    pub failures: Vec<(CacheKey, CacheError)>,
}

impl BatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Key-value cache with per-key time-to-live.
///
/// Implementations must be safe to share between tasks and must not hold a
/// lock across an await point.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get a live value. Expired entries read as `None`.
    async fn get(&self, key: &CacheKey) -> CacheResult<Option<Vec<u8>>>;

    /// Store a value that expires after `ttl`.
    async fn set(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration) -> CacheResult<()>;

    /// Remove a key. Removing an absent key is not an error.
    async fn delete(&self, key: &CacheKey) -> CacheResult<()>;

    /// Apply a batch of writes.
    ///
    /// `Err` means nothing can be said about the batch (e.g. the backend is
    /// unreachable). Per-op failures are reported in [`BatchOutcome`].
    /// The default applies ops one by one.
    async fn execute(&self, batch: CacheBatch) -> CacheResult<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        for op in batch.into_ops() {
            let result = match &op {
                CacheOp::Set { key, value, ttl } => self.set(key, value.clone(), *ttl).await,
                CacheOp::Delete { key } => self.delete(key).await,
            };
            match result {
                Ok(()) => outcome.applied += 1,
                Err(e) => outcome.failures.push((op.key().clone(), e)),
            }
        }
        Ok(outcome)
    }
}

/// Backends refuse zero ttl; such an entry could never be read.
pub(crate) fn check_ttl(ttl: Duration) -> CacheResult<()> {
    if ttl.is_zero() {
        return Err(CacheError::Backend {
            reason: "ttl must be greater than zero".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use navmap_core::{BeaconId, MapId};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Backend that only implements the single-key ops and rejects one key.
    #[derive(Default)]
    struct SingleOpBackend {
        entries: Mutex<HashMap<String, Vec<u8>>>,
        reject: Option<String>,
    }

    #[async_trait]
    impl CacheBackend for SingleOpBackend {
        async fn get(&self, key: &CacheKey) -> CacheResult<Option<Vec<u8>>> {
            Ok(self.entries.lock().unwrap().get(key.as_str()).cloned())
        }

        async fn set(&self, key: &CacheKey, value: Vec<u8>, _ttl: Duration) -> CacheResult<()> {
            if self.reject.as_deref() == Some(key.as_str()) {
                return Err(CacheError::Backend {
                    reason: "rejected".to_string(),
                });
            }
            self.entries
                .lock()
                .unwrap()
                .insert(key.as_str().to_string(), value);
            Ok(())
        }

        async fn delete(&self, key: &CacheKey) -> CacheResult<()> {
            self.entries.lock().unwrap().remove(key.as_str());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_default_execute_reports_partial_failure() {
        let rejected = CacheKey::beacon(&BeaconId::new("bad"));
        let backend = SingleOpBackend {
            reject: Some(rejected.as_str().to_string()),
            ..Default::default()
        };
        let primary = CacheKey::primary(&MapId::now_v7());

        let mut batch = CacheBatch::new();
        batch
            .set(primary.clone(), b"doc".to_vec(), Duration::from_secs(1))
            .set(rejected.clone(), b"ptr".to_vec(), Duration::from_secs(1));

        let outcome = backend.execute(batch).await.unwrap();
        assert_eq!(outcome.applied, 1);
        assert!(!outcome.is_complete());
        assert_eq!(outcome.failures[0].0, rejected);
        assert_eq!(backend.get(&primary).await.unwrap(), Some(b"doc".to_vec()));
    }

    #[tokio::test]
    async fn test_batch_applies_in_order() {
        let backend = SingleOpBackend::default();
        let key = CacheKey::primary(&MapId::now_v7());

        let mut batch = CacheBatch::new();
        batch
            .set(key.clone(), b"first".to_vec(), Duration::from_secs(1))
            .set(key.clone(), b"second".to_vec(), Duration::from_secs(1));
        assert_eq!(batch.len(), 2);

        backend.execute(batch).await.unwrap();
        assert_eq!(backend.get(&key).await.unwrap(), Some(b"second".to_vec()));
    }

    #[test]
    fn test_check_ttl() {
        assert!(check_ttl(Duration::ZERO).is_err());
        assert!(check_ttl(Duration::from_millis(1)).is_ok());
    }
}
