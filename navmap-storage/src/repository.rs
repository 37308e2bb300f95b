//! Cache-aside lookup repository for map documents.
//!
//! Reads go cache first and fall back to the store; a store hit repopulates
//! the cache. Lookups by beacon take two hops: the indirection entry
//! `map:beacon:<beacon>` names the primary entry `map:<id>`, which holds the
//! encoded document. Writes never update the cache, and deletes invalidate
//! every key the deleted document could have populated.
//!
//! The cache never decides an outcome. Any cache error, undecodable value or
//! inconsistent entry is counted in [`CacheMetrics`], logged, and handled as
//! a miss (reads) or ignored (writes and invalidation).

use std::sync::Arc;

use futures_util::future::join_all;
use navmap_core::{
    BeaconId, Lookup, MapDocument, MapId, NavmapError, NavmapResult, RepositoryConfig,
    ADDRESS_PROPERTY,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::{CacheBackend, CacheBatch, CacheKey};
use crate::codec::{Codec, JsonCodec};
use crate::metrics::CacheMetrics;
use crate::store::{DocumentFilter, DocumentStore, ElementMatch, IndexSpec, FEATURES_FIELD};

/// Two-tier repository: a [`CacheBackend`] in front of a [`DocumentStore`].
///
/// # Type Parameters
///
/// - `C`: the cache backend (may be `dyn CacheBackend`)
/// - `S`: the document store (may be `dyn DocumentStore`)
/// - `K`: the codec used for cached documents
///
/// # Example
///
/// ```ignore
/// let repo = LookupRepository::new(
///     Arc::new(InMemoryCache::new()),
///     Arc::new(InMemoryDocumentStore::new()),
///     RepositoryConfig::from_env(),
/// );
/// repo.create(&doc).await?;
/// let found = repo.get_by_beacon(&BeaconId::new("AA:BB:CC")).await?;
/// ```
pub struct LookupRepository<C: ?Sized, S: ?Sized, K = JsonCodec> {
    cache: Arc<C>,
    store: Arc<S>,
    codec: K,
    config: RepositoryConfig,
    metrics: Arc<CacheMetrics>,
}

impl<C, S> LookupRepository<C, S, JsonCodec>
where
    C: CacheBackend + ?Sized,
    S: DocumentStore + ?Sized,
{
    /// Create a repository that caches documents as JSON.
    pub fn new(cache: Arc<C>, store: Arc<S>, config: RepositoryConfig) -> Self {
        Self::with_codec(cache, store, JsonCodec, config)
    }
}

impl<C, S, K> LookupRepository<C, S, K>
where
    C: CacheBackend + ?Sized,
    S: DocumentStore + ?Sized,
    K: Codec,
{
    pub fn with_codec(cache: Arc<C>, store: Arc<S>, codec: K, config: RepositoryConfig) -> Self {
        Self {
            cache,
            store,
            codec,
            config,
            metrics: Arc::new(CacheMetrics::new()),
        }
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Counters for cache traffic and contained failures.
    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Ensure every index lookups rely on. Idempotent.
    ///
    /// [`create`](Self::create) calls this itself; hosts may also call it once
    /// at startup.
    pub async fn ensure_indexes(&self) -> NavmapResult<()> {
        self.store
            .ensure_index(&IndexSpec::spatial_2d(FEATURES_FIELD))
            .await?;
        Ok(())
    }

    // ========================================================================
    // OPERATIONS
    // ========================================================================

    /// Persist a new document. The cache is not touched.
    ///
    /// An index failure aborts before the insert.
    pub async fn create(&self, doc: &MapDocument) -> NavmapResult<()> {
        self.ensure_indexes().await?;
        self.store.insert_one(doc).await?;
        info!(
            map_id = %doc.id,
            beacons = doc.beacon_ids().count(),
            "map created"
        );
        Ok(())
    }

    /// Find the first document with a feature carrying `beacon`.
    pub async fn get_by_beacon(&self, beacon: &BeaconId) -> NavmapResult<MapDocument> {
        if let Some(doc) = self.cached_by_beacon(beacon).await {
            self.metrics.record_hit();
            debug!(beacon = %beacon, map_id = %doc.id, "cache hit");
            return Ok(doc);
        }

        self.metrics.record_miss();
        self.metrics.record_store_fetch();
        debug!(beacon = %beacon, "cache miss, querying store");
        let doc = self
            .store
            .find_one_by_element(&ElementMatch::beacon(beacon))
            .await?
            .ok_or_else(|| NavmapError::not_found(Lookup::Beacon(beacon.clone())))?;

        self.populate(&doc).await;
        Ok(doc)
    }

    /// Find a document by its primary id.
    pub async fn get_by_id(&self, id: &MapId) -> NavmapResult<MapDocument> {
        if let Some(doc) = self.cached_document(id).await {
            self.metrics.record_hit();
            debug!(map_id = %id, "cache hit");
            return Ok(doc);
        }

        self.metrics.record_miss();
        self.metrics.record_store_fetch();
        debug!(map_id = %id, "cache miss, querying store");
        let doc = self
            .store
            .find_one(&DocumentFilter::Id(*id))
            .await?
            .ok_or_else(|| NavmapError::not_found(Lookup::Id(*id)))?;

        // Only the primary entry: a beacon shared with an older map must keep
        // resolving to the older map.
        self.populate_primary(&doc).await;
        Ok(doc)
    }

    /// Remove the first document carrying `beacon` and return it.
    ///
    /// After the store delete succeeds, the primary entry and every
    /// indirection entry of the removed document are deleted concurrently.
    /// Invalidation failures are contained.
    pub async fn delete_by_beacon(&self, beacon: &BeaconId) -> NavmapResult<MapDocument> {
        let doc = self
            .store
            .find_one_and_delete_by_element(&ElementMatch::beacon(beacon))
            .await?
            .ok_or_else(|| NavmapError::not_found(Lookup::Beacon(beacon.clone())))?;

        info!(beacon = %beacon, map_id = %doc.id, "map deleted");
        self.invalidate(&doc).await;
        Ok(doc)
    }

    /// Any stored document. Bypasses the cache.
    pub async fn get_any(&self) -> NavmapResult<MapDocument> {
        self.metrics.record_store_fetch();
        self.store
            .find_one(&DocumentFilter::Any)
            .await?
            .ok_or_else(|| NavmapError::not_found(Lookup::Any))
    }

    /// First document whose map-level `address` equals `address`. Bypasses
    /// the cache.
    pub async fn get_by_address(&self, address: &str) -> NavmapResult<MapDocument> {
        self.metrics.record_store_fetch();
        let filter = DocumentFilter::Metadata {
            key: ADDRESS_PROPERTY.to_string(),
            value: Value::String(address.to_string()),
        };
        self.store
            .find_one(&filter)
            .await?
            .ok_or_else(|| NavmapError::not_found(Lookup::Address(address.to_string())))
    }

    // ========================================================================
    // CACHE HELPERS
    // ========================================================================

    /// Follow the indirection entry for `beacon` to a cached document.
    async fn cached_by_beacon(&self, beacon: &BeaconId) -> Option<MapDocument> {
        let key = CacheKey::beacon(beacon);
        let pointer = self.read_cache(&key).await?;

        let id = match CacheKey::parse_primary(&pointer) {
            Some(id) => id,
            None => {
                self.metrics.record_read_failure();
                warn!(key = %key, "malformed indirection entry, falling back to store");
                return None;
            }
        };

        let doc = self.cached_document(&id).await?;
        // A stale pointer can outlive an edit of the target; never serve a
        // document that does not carry the beacon asked for.
        if doc.contains_beacon(beacon) {
            Some(doc)
        } else {
            debug!(key = %key, map_id = %id, "indirection target lacks beacon");
            None
        }
    }

    async fn cached_document(&self, id: &MapId) -> Option<MapDocument> {
        let key = CacheKey::primary(id);
        let bytes = self.read_cache(&key).await?;

        match self.codec.decode(&bytes) {
            Ok(doc) if doc.id == *id => Some(doc),
            Ok(doc) => {
                self.metrics.record_read_failure();
                warn!(key = %key, found = %doc.id, "cached document has wrong id");
                None
            }
            Err(e) => {
                self.metrics.record_read_failure();
                warn!(error = %e, key = %key, "undecodable cache entry, falling back to store");
                None
            }
        }
    }

    async fn read_cache(&self, key: &CacheKey) -> Option<Vec<u8>> {
        match self.cache.get(key).await {
            Ok(value) => value,
            Err(e) => {
                self.metrics.record_read_failure();
                warn!(error = %e, key = %key, "cache read failed, falling back to store");
                None
            }
        }
    }

    /// Write the document and its indirection entries in one batch.
    async fn populate(&self, doc: &MapDocument) {
        let Some(mut batch) = self.primary_batch(doc) else {
            return;
        };
        let primary = CacheKey::primary(&doc.id);
        for beacon in doc.beacon_ids() {
            batch.set(
                CacheKey::beacon(&beacon),
                primary.as_bytes().to_vec(),
                self.config.cache_ttl,
            );
        }
        self.submit(doc, batch).await;
    }

    /// Write the primary entry alone.
    async fn populate_primary(&self, doc: &MapDocument) {
        if let Some(batch) = self.primary_batch(doc) {
            self.submit(doc, batch).await;
        }
    }

    fn primary_batch(&self, doc: &MapDocument) -> Option<CacheBatch> {
        let bytes = match self.codec.encode(doc) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.metrics.record_write_failures(1);
                warn!(error = %e, map_id = %doc.id, "could not encode document for cache");
                return None;
            }
        };

        let mut batch = CacheBatch::new();
        batch.set(CacheKey::primary(&doc.id), bytes, self.config.cache_ttl);
        Some(batch)
    }

    async fn submit(&self, doc: &MapDocument, batch: CacheBatch) {
        let submitted = batch.len();
        match self.cache.execute(batch).await {
            Ok(outcome) if outcome.is_complete() => {
                debug!(map_id = %doc.id, entries = submitted, "cache populated");
            }
            Ok(outcome) => {
                self.metrics.record_write_failures(outcome.failures.len() as u64);
                for (key, e) in &outcome.failures {
                    warn!(error = %e, key = %key, "cache write failed");
                }
            }
            Err(e) => {
                self.metrics.record_write_failures(submitted as u64);
                warn!(error = %e, map_id = %doc.id, "cache batch failed");
            }
        }
    }

    /// Delete every key `doc` could have populated.
    async fn invalidate(&self, doc: &MapDocument) {
        let mut keys = vec![CacheKey::primary(&doc.id)];
        for beacon in doc.beacon_ids() {
            let key = CacheKey::beacon(&beacon);
            if !keys.contains(&key) {
                keys.push(key);
            }
        }

        let results = join_all(keys.iter().map(|key| self.cache.delete(key))).await;

        let mut failures = 0u64;
        for (key, result) in keys.iter().zip(results) {
            if let Err(e) = result {
                failures += 1;
                warn!(error = %e, key = %key, "cache invalidation failed");
            }
        }
        if failures > 0 {
            self.metrics.record_invalidation_failures(failures);
        } else {
            debug!(map_id = %doc.id, keys = keys.len(), "cache invalidated");
        }
    }
}

impl<C: ?Sized, S: ?Sized, K: Clone> Clone for LookupRepository<C, S, K> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            store: Arc::clone(&self.store),
            codec: self.codec.clone(),
            config: self.config.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }
}
