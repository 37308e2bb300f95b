//! LMDB-backed cache backend.
//!
//! Uses the heed crate (Rust bindings for LMDB) for a memory-mapped key-value
//! store that survives process restarts, which keeps the cache warm across
//! deploys of a single node.
//!
//! # Value Format
//!
//! `[expires_at: 8 bytes, little-endian unix millis][payload]`
//!
//! Expired values read as misses and are removed lazily on read or in bulk by
//! [`LmdbCache::purge_expired`].
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. Reads use read transactions, writes use
//! write transactions, and a [`CacheBatch`] is applied in a single write
//! transaction.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, RwTxn};
use navmap_core::{CacheError, CacheResult};

use super::keys::CacheKey;
use super::traits::{check_ttl, BatchOutcome, CacheBackend, CacheBatch, CacheOp};

const HEADER_LEN: usize = 8;

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbCacheError> for CacheError {
    fn from(e: LmdbCacheError) -> Self {
        match e {
            LmdbCacheError::EnvOpen(_) | LmdbCacheError::DbOpen(_) | LmdbCacheError::Io(_) => {
                CacheError::Connection {
                    reason: e.to_string(),
                }
            }
            LmdbCacheError::Transaction(_) => CacheError::Backend {
                reason: e.to_string(),
            },
        }
    }
}

fn txn_err(e: heed::Error) -> LmdbCacheError {
    LmdbCacheError::Transaction(e.to_string())
}

/// Location and size of the LMDB cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LmdbCacheConfig {
    /// Directory where LMDB files are stored.
    pub path: PathBuf,
    /// Maximum size of the memory map in megabytes.
    pub max_size_mb: usize,
}

impl Default for LmdbCacheConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/navmap-cache"),
            max_size_mb: 256,
        }
    }
}

impl LmdbCacheConfig {
    /// Environment variables:
    /// - `NAVMAP_LMDB_PATH` (default: ./data/navmap-cache)
    /// - `NAVMAP_LMDB_MAX_SIZE_MB` (default: 256)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            path: std::env::var("NAVMAP_LMDB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.path),
            max_size_mb: std::env::var("NAVMAP_LMDB_MAX_SIZE_MB")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_size_mb),
        }
    }
}

/// LMDB cache with per-key expiry.
pub struct LmdbCache {
    env: Env,
    db: Database<Bytes, Bytes>,
}

impl LmdbCache {
    /// Open (or create) a cache at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the LMDB
    /// environment/database cannot be opened.
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_err)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_err)?;

        Ok(Self { env, db })
    }

    pub fn open(config: &LmdbCacheConfig) -> Result<Self, LmdbCacheError> {
        Self::new(&config.path, config.max_size_mb)
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> CacheResult<u64> {
        let now = now_millis();
        let expired = self.collect_keys(|value| !is_live(value, now))?;

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let mut deleted = 0u64;
        for key in &expired {
            // A set since the scan may have refreshed the entry.
            let still_expired = self
                .db
                .get(&wtxn, key)
                .map_err(txn_err)?
                .is_some_and(|value| !is_live(value, now));
            if still_expired && self.db.delete(&mut wtxn, key).map_err(txn_err)? {
                deleted += 1;
            }
        }
        wtxn.commit().map_err(txn_err)?;
        Ok(deleted)
    }

    /// Number of stored entries, expired ones included until purged.
    pub fn len(&self) -> CacheResult<u64> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        Ok(self.db.len(&rtxn).map_err(txn_err)?)
    }

    pub fn is_empty(&self) -> CacheResult<bool> {
        Ok(self.len()? == 0)
    }

    fn collect_keys<F>(&self, mut predicate: F) -> Result<Vec<Vec<u8>>, LmdbCacheError>
    where
        F: FnMut(&[u8]) -> bool,
    {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let mut keys = Vec::new();
        for entry in self.db.iter(&rtxn).map_err(txn_err)? {
            let (key, value) = entry.map_err(txn_err)?;
            if predicate(value) {
                keys.push(key.to_vec());
            }
        }
        Ok(keys)
    }

    /// Delete `key` unless a writer refreshed it after it was seen stale, in
    /// which case the fresh payload is returned.
    fn evict_stale(&self, key: &CacheKey, now: i64) -> CacheResult<Option<Vec<u8>>> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let refreshed = self
            .db
            .get(&wtxn, key.as_bytes())
            .map_err(txn_err)?
            .filter(|value| is_live(value, now))
            .map(|value| payload_of(value).to_vec());
        if refreshed.is_none() {
            self.db.delete(&mut wtxn, key.as_bytes()).map_err(txn_err)?;
        }
        wtxn.commit().map_err(txn_err)?;
        Ok(refreshed)
    }

    fn apply(&self, wtxn: &mut RwTxn<'_>, op: &CacheOp, now: i64) -> CacheResult<()> {
        match op {
            CacheOp::Set { key, value, ttl } => {
                let framed = frame(value, expires_at(now, *ttl)?);
                self.db
                    .put(wtxn, key.as_bytes(), framed.as_slice())
                    .map_err(txn_err)?;
            }
            CacheOp::Delete { key } => {
                self.db.delete(wtxn, key.as_bytes()).map_err(txn_err)?;
            }
        }
        Ok(())
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn expires_at(now: i64, ttl: Duration) -> CacheResult<i64> {
    check_ttl(ttl)?;
    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    // Sub-millisecond ttls still get one millisecond.
    Ok(now.saturating_add(ttl_ms.max(1)))
}

fn frame(payload: &[u8], expires_at: i64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(&expires_at.to_le_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

fn expiry_of(value: &[u8]) -> Option<i64> {
    let header: [u8; HEADER_LEN] = value.get(..HEADER_LEN)?.try_into().ok()?;
    Some(i64::from_le_bytes(header))
}

fn payload_of(value: &[u8]) -> &[u8] {
    &value[HEADER_LEN.min(value.len())..]
}

fn is_live(value: &[u8], now: i64) -> bool {
    expiry_of(value).is_some_and(|expires_at| now < expires_at)
}

#[async_trait]
impl CacheBackend for LmdbCache {
    async fn get(&self, key: &CacheKey) -> CacheResult<Option<Vec<u8>>> {
        let now = now_millis();
        let found = {
            let rtxn = self.env.read_txn().map_err(txn_err)?;
            self.db
                .get(&rtxn, key.as_bytes())
                .map_err(txn_err)?
                .map(|value| (is_live(value, now), payload_of(value).to_vec()))
        };

        match found {
            Some((true, payload)) => Ok(Some(payload)),
            // Expired or malformed.
            Some((false, _)) => self.evict_stale(key, now),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        let framed = frame(&value, expires_at(now_millis(), ttl)?);
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        self.db
            .put(&mut wtxn, key.as_bytes(), framed.as_slice())
            .map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> CacheResult<()> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        self.db.delete(&mut wtxn, key.as_bytes()).map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(())
    }

    async fn execute(&self, batch: CacheBatch) -> CacheResult<BatchOutcome> {
        let now = now_millis();
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let mut outcome = BatchOutcome::default();
        for op in batch.ops() {
            match self.apply(&mut wtxn, op, now) {
                Ok(()) => outcome.applied += 1,
                Err(e) => outcome.failures.push((op.key().clone(), e)),
            }
        }
        wtxn.commit().map_err(txn_err)?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use navmap_core::{BeaconId, MapId};
    use tempfile::TempDir;

    fn create_test_cache() -> (LmdbCache, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let cache = LmdbCache::new(temp_dir.path(), 10).expect("cache creation should succeed");
        (cache, temp_dir)
    }

    fn primary() -> CacheKey {
        CacheKey::primary(&MapId::now_v7())
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let (cache, _temp_dir) = create_test_cache();
        let key = primary();

        cache
            .set(&key, b"payload".to_vec(), Duration::from_secs(60))
            .await
            .expect("set should succeed");

        let value = cache.get(&key).await.expect("get should succeed");
        assert_eq!(value, Some(b"payload".to_vec()));
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let (cache, _temp_dir) = create_test_cache();
        assert_eq!(cache.get(&primary()).await.expect("get should succeed"), None);
    }

    #[tokio::test]
    async fn test_delete() {
        let (cache, _temp_dir) = create_test_cache();
        let key = primary();
        cache
            .set(&key, b"payload".to_vec(), Duration::from_secs(60))
            .await
            .expect("set should succeed");

        cache.delete(&key).await.expect("delete should succeed");
        assert_eq!(cache.get(&key).await.expect("get should succeed"), None);
        cache.delete(&key).await.expect("deleting twice is fine");
    }

    #[tokio::test]
    async fn test_overwrite() {
        let (cache, _temp_dir) = create_test_cache();
        let key = primary();
        cache
            .set(&key, b"first".to_vec(), Duration::from_secs(60))
            .await
            .expect("set should succeed");
        cache
            .set(&key, b"second".to_vec(), Duration::from_secs(60))
            .await
            .expect("set should succeed");

        assert_eq!(
            cache.get(&key).await.expect("get should succeed"),
            Some(b"second".to_vec())
        );
        assert_eq!(cache.len().expect("len"), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss_and_removed() {
        let (cache, _temp_dir) = create_test_cache();
        let key = primary();
        cache
            .set(&key, b"short".to_vec(), Duration::from_millis(20))
            .await
            .expect("set should succeed");

        std::thread::sleep(Duration::from_millis(60));

        assert_eq!(cache.get(&key).await.expect("get should succeed"), None);
        assert!(cache.is_empty().expect("is_empty"));
    }

    #[tokio::test]
    async fn test_entry_refreshed_after_stale_read_survives_eviction() {
        let (cache, _temp_dir) = create_test_cache();
        let key = primary();
        cache
            .set(&key, b"old".to_vec(), Duration::from_millis(20))
            .await
            .expect("set should succeed");
        std::thread::sleep(Duration::from_millis(60));
        let seen_stale_at = now_millis();

        // A writer lands between the stale read and the eviction.
        cache
            .set(&key, b"fresh".to_vec(), Duration::from_secs(60))
            .await
            .expect("set should succeed");

        let refreshed = cache.evict_stale(&key, seen_stale_at).expect("evict");
        assert_eq!(refreshed, Some(b"fresh".to_vec()));
        assert_eq!(
            cache.get(&key).await.expect("get should succeed"),
            Some(b"fresh".to_vec())
        );
    }

    #[test]
    fn test_evicting_a_stale_entry_removes_it() {
        let (cache, _temp_dir) = create_test_cache();
        let key = primary();
        let mut wtxn = cache.env.write_txn().expect("write txn");
        cache
            .db
            .put(&mut wtxn, key.as_bytes(), frame(b"old", 0).as_slice())
            .expect("put");
        wtxn.commit().expect("commit");

        assert_eq!(cache.evict_stale(&key, now_millis()).expect("evict"), None);
        assert!(cache.is_empty().expect("is_empty"));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let (cache, _temp_dir) = create_test_cache();
        let short = primary();
        let long = primary();
        cache
            .set(&short, b"s".to_vec(), Duration::from_millis(20))
            .await
            .expect("set should succeed");
        cache
            .set(&long, b"l".to_vec(), Duration::from_secs(60))
            .await
            .expect("set should succeed");

        std::thread::sleep(Duration::from_millis(60));

        assert_eq!(cache.purge_expired().expect("purge"), 1);
        assert_eq!(
            cache.get(&long).await.expect("get should succeed"),
            Some(b"l".to_vec())
        );
    }

    #[tokio::test]
    async fn test_execute_batch_in_one_transaction() {
        let (cache, _temp_dir) = create_test_cache();
        let doc_key = primary();
        let beacon_a = CacheKey::beacon(&BeaconId::new("a"));
        let beacon_b = CacheKey::beacon(&BeaconId::new("b"));
        cache
            .set(&beacon_b, b"stale".to_vec(), Duration::from_secs(60))
            .await
            .expect("set should succeed");

        let mut batch = CacheBatch::new();
        batch
            .set(doc_key.clone(), b"doc".to_vec(), Duration::from_secs(60))
            .set(
                beacon_a.clone(),
                doc_key.as_bytes().to_vec(),
                Duration::from_secs(60),
            )
            .delete(beacon_b.clone())
            .set(primary(), b"rejected".to_vec(), Duration::ZERO);

        let outcome = cache.execute(batch).await.expect("execute should succeed");
        assert_eq!(outcome.applied, 3);
        assert_eq!(outcome.failures.len(), 1);

        assert_eq!(
            cache.get(&beacon_a).await.expect("get should succeed"),
            Some(doc_key.as_bytes().to_vec())
        );
        assert_eq!(cache.get(&beacon_b).await.expect("get should succeed"), None);
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let key = primary();
        {
            let cache = LmdbCache::new(temp_dir.path(), 10).expect("open");
            cache
                .set(&key, b"persisted".to_vec(), Duration::from_secs(60))
                .await
                .expect("set should succeed");
        }
        let cache = LmdbCache::open(&LmdbCacheConfig {
            path: temp_dir.path().to_path_buf(),
            max_size_mb: 10,
        })
        .expect("reopen");
        assert_eq!(
            cache.get(&key).await.expect("get should succeed"),
            Some(b"persisted".to_vec())
        );
    }

    #[test]
    fn test_frame_header() {
        let framed = frame(b"abc", 42);
        assert_eq!(expiry_of(&framed), Some(42));
        assert!(is_live(&framed, 41));
        assert!(!is_live(&framed, 42));
        assert!(!is_live(b"short", 0), "malformed values are never live");
    }
}
