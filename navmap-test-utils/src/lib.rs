//! navmap Test Utilities
//!
//! Shared test infrastructure for the navmap workspace:
//! - Instrumented and faulty cache/store doubles
//! - Proptest generators for map documents
//! - Test fixtures for common scenarios
//! - Assertions over repository results

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

pub use navmap_core::{
    BeaconId, CacheError, CacheResult, ErrorKind, Feature, Geometry, MapDocument, MapId,
    NavmapError, NavmapResult, RepositoryConfig, StoreError, StoreResult,
};
pub use navmap_storage::{
    BatchOutcome, CacheBackend, CacheBatch, CacheKey, CacheOp, DocumentFilter, DocumentStore,
    ElementMatch, InMemoryCache, InMemoryDocumentStore, IndexSpec, KeyKind, LookupRepository,
};

// ============================================================================
// STORE DOUBLES
// ============================================================================

/// Store wrapper counting every call that reaches the inner store.
#[derive(Debug, Default)]
pub struct CountingStore<S> {
    inner: S,
    index_calls: AtomicUsize,
    inserts: AtomicUsize,
    reads: AtomicUsize,
    deletes: AtomicUsize,
}

impl<S: DocumentStore> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            index_calls: AtomicUsize::new(0),
            inserts: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn index_calls(&self) -> usize {
        self.index_calls.load(Ordering::SeqCst)
    }

    pub fn inserts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    /// `find_one` and `find_one_by_element` calls.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S: DocumentStore> DocumentStore for CountingStore<S> {
    async fn ensure_index(&self, spec: &IndexSpec) -> StoreResult<()> {
        self.index_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.ensure_index(spec).await
    }

    async fn insert_one(&self, doc: &MapDocument) -> StoreResult<()> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.inner.insert_one(doc).await
    }

    async fn find_one(&self, filter: &DocumentFilter) -> StoreResult<Option<MapDocument>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.find_one(filter).await
    }

    async fn find_one_by_element(
        &self,
        element: &ElementMatch,
    ) -> StoreResult<Option<MapDocument>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.find_one_by_element(element).await
    }

    async fn find_one_and_delete_by_element(
        &self,
        element: &ElementMatch,
    ) -> StoreResult<Option<MapDocument>> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.find_one_and_delete_by_element(element).await
    }
}

/// Store wrapper that sleeps before every call. Pair with a paused tokio
/// clock to exercise deadlines without real waiting.
#[derive(Debug)]
pub struct SlowStore<S> {
    inner: S,
    delay: Duration,
}

impl<S: DocumentStore> SlowStore<S> {
    pub fn new(inner: S, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl<S: DocumentStore> DocumentStore for SlowStore<S> {
    async fn ensure_index(&self, spec: &IndexSpec) -> StoreResult<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.ensure_index(spec).await
    }

    async fn insert_one(&self, doc: &MapDocument) -> StoreResult<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.insert_one(doc).await
    }

    async fn find_one(&self, filter: &DocumentFilter) -> StoreResult<Option<MapDocument>> {
        tokio::time::sleep(self.delay).await;
        self.inner.find_one(filter).await
    }

    async fn find_one_by_element(
        &self,
        element: &ElementMatch,
    ) -> StoreResult<Option<MapDocument>> {
        tokio::time::sleep(self.delay).await;
        self.inner.find_one_by_element(element).await
    }

    async fn find_one_and_delete_by_element(
        &self,
        element: &ElementMatch,
    ) -> StoreResult<Option<MapDocument>> {
        tokio::time::sleep(self.delay).await;
        self.inner.find_one_and_delete_by_element(element).await
    }
}

/// Store whose every call fails with a connection error.
#[derive(Debug, Default)]
pub struct UnreachableStore;

fn store_down() -> StoreError {
    StoreError::Connection {
        reason: "store unreachable".to_string(),
    }
}

#[async_trait]
impl DocumentStore for UnreachableStore {
    async fn ensure_index(&self, _spec: &IndexSpec) -> StoreResult<()> {
        Err(store_down())
    }

    async fn insert_one(&self, _doc: &MapDocument) -> StoreResult<()> {
        Err(store_down())
    }

    async fn find_one(&self, _filter: &DocumentFilter) -> StoreResult<Option<MapDocument>> {
        Err(store_down())
    }

    async fn find_one_by_element(
        &self,
        _element: &ElementMatch,
    ) -> StoreResult<Option<MapDocument>> {
        Err(store_down())
    }

    async fn find_one_and_delete_by_element(
        &self,
        _element: &ElementMatch,
    ) -> StoreResult<Option<MapDocument>> {
        Err(store_down())
    }
}

// ============================================================================
// CACHE DOUBLES
// ============================================================================

/// Cache where every call fails. Counts attempts.
#[derive(Debug, Default)]
pub struct FailingCache {
    calls: AtomicUsize,
}

impl FailingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> CacheResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Connection {
            reason: "connection refused".to_string(),
        })
    }
}

#[async_trait]
impl CacheBackend for FailingCache {
    async fn get(&self, _key: &CacheKey) -> CacheResult<Option<Vec<u8>>> {
        self.fail()
    }

    async fn set(&self, _key: &CacheKey, _value: Vec<u8>, _ttl: Duration) -> CacheResult<()> {
        self.fail()
    }

    async fn delete(&self, _key: &CacheKey) -> CacheResult<()> {
        self.fail()
    }

    async fn execute(&self, _batch: CacheBatch) -> CacheResult<BatchOutcome> {
        self.fail()
    }
}

/// In-memory cache whose batches fail in a controlled way.
///
/// Single-key calls always go through to the inner cache.
#[derive(Debug)]
pub struct FlakyBatchCache {
    inner: InMemoryCache,
    rejected_kind: Option<KeyKind>,
}

impl FlakyBatchCache {
    /// Batches fail as a whole; nothing is written.
    pub fn rejecting_batches() -> Self {
        Self {
            inner: InMemoryCache::new(),
            rejected_kind: None,
        }
    }

    /// Batch ops on keys of `kind` fail individually; the rest are applied.
    pub fn rejecting_kind(kind: KeyKind) -> Self {
        Self {
            inner: InMemoryCache::new(),
            rejected_kind: Some(kind),
        }
    }

    pub fn inner(&self) -> &InMemoryCache {
        &self.inner
    }
}

#[async_trait]
impl CacheBackend for FlakyBatchCache {
    async fn get(&self, key: &CacheKey) -> CacheResult<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &CacheKey) -> CacheResult<()> {
        self.inner.delete(key).await
    }

    async fn execute(&self, batch: CacheBatch) -> CacheResult<BatchOutcome> {
        let rejected = match self.rejected_kind {
            Some(kind) => kind,
            None => {
                return Err(CacheError::Backend {
                    reason: "pipeline aborted".to_string(),
                })
            }
        };

        let mut outcome = BatchOutcome::default();
        let mut passed = CacheBatch::new();
        for op in batch.into_ops() {
            if op.key().kind() == rejected {
                let reason = "write rejected".to_string();
                outcome.failures.push((op.key().clone(), CacheError::Backend { reason }));
                continue;
            }
            match op {
                CacheOp::Set { key, value, ttl } => passed.set(key, value, ttl),
                CacheOp::Delete { key } => passed.delete(key),
            };
        }

        let applied = self.inner.execute(passed).await?;
        outcome.applied = applied.applied;
        outcome.failures.extend(applied.failures);
        Ok(outcome)
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for map documents.

    use super::*;
    use proptest::prelude::*;
    use uuid::Uuid;

    /// Generate a random MapId.
    pub fn arb_map_id() -> impl Strategy<Value = MapId> {
        any::<[u8; 16]>().prop_map(|bytes| MapId::new(Uuid::from_bytes(bytes)))
    }

    /// Generate a MAC-style beacon id.
    pub fn arb_beacon_id() -> impl Strategy<Value = BeaconId> {
        "[0-9A-F]{2}(:[0-9A-F]{2}){5}".prop_map(|s| BeaconId::new(s))
    }

    /// Any finite coordinate, subnormals and extremes included.
    pub fn arb_coordinate() -> impl Strategy<Value = f64> {
        prop_oneof![
            -1000.0f64..1000.0,
            any::<f64>().prop_filter("finite", |x| x.is_finite()),
        ]
    }

    pub fn arb_point() -> impl Strategy<Value = Geometry> {
        (arb_coordinate(), arb_coordinate()).prop_map(|(x, y)| Geometry::point(x, y))
    }

    /// Feature with a beacon id.
    pub fn arb_beacon_feature() -> impl Strategy<Value = Feature> {
        (arb_beacon_id(), arb_coordinate(), arb_coordinate())
            .prop_map(|(id, x, y)| Feature::beacon(id.as_str(), x, y))
    }

    /// Feature without a beacon id.
    pub fn arb_plain_feature() -> impl Strategy<Value = Feature> {
        let object_type = prop_oneof![Just("wall"), Just("door"), Just("room")];
        (
            object_type,
            arb_coordinate(),
            arb_coordinate(),
            arb_coordinate(),
            arb_coordinate(),
        )
            .prop_map(|(kind, x1, y1, x2, y2)| {
                Feature::new(Geometry::line((x1, y1), (x2, y2))).with_property("objectType", kind)
            })
    }

    /// Any map, possibly without beacons.
    pub fn arb_map_document() -> impl Strategy<Value = MapDocument> {
        let feature = prop_oneof![arb_beacon_feature(), arb_plain_feature()];
        (
            arb_map_id(),
            proptest::option::of("[a-z]{3,10}"),
            prop::collection::vec(feature, 0..6),
        )
            .prop_map(|(id, creator, features)| build_map(id, creator, features))
    }

    /// Map carrying between one and four distinct beacons.
    pub fn arb_beaconed_map() -> impl Strategy<Value = MapDocument> {
        (
            arb_map_id(),
            prop::collection::btree_set(arb_beacon_id().prop_map(|b| b.as_str().to_string()), 1..5),
            prop::collection::vec(arb_plain_feature(), 0..3),
        )
            .prop_map(|(id, beacons, plain)| {
                let mut features: Vec<Feature> = beacons
                    .iter()
                    .enumerate()
                    .map(|(i, b)| Feature::beacon(b.as_str(), i as f64, 0.0))
                    .collect();
                features.extend(plain);
                build_map(id, None, features)
            })
    }

    fn build_map(id: MapId, creator: Option<String>, features: Vec<Feature>) -> MapDocument {
        let doc = match creator {
            Some(creator) => MapDocument::new(id).with_creator(creator),
            None => MapDocument::new(id),
        };
        features.into_iter().fold(doc, |doc, f| doc.with_feature(f))
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Ready-made documents and repositories.

    use super::*;

    pub type CountingRepository =
        LookupRepository<InMemoryCache, CountingStore<InMemoryDocumentStore>>;

    /// Map with one beacon feature per id and a wall.
    pub fn beacon_map(beacons: &[&str]) -> MapDocument {
        let doc = beacons
            .iter()
            .enumerate()
            .fold(MapDocument::new(MapId::now_v7()), |doc, (i, b)| {
                doc.with_feature(Feature::beacon(*b, i as f64 * 2.0, 1.0))
            });
        doc.with_creator("fixture")
            .with_feature(wall((0.0, 0.0), (10.0, 0.0)))
    }

    /// Map whose features carry no beacon id.
    pub fn unbeaconed_map() -> MapDocument {
        MapDocument::new(MapId::now_v7())
            .with_feature(wall((0.0, 0.0), (0.0, 10.0)))
            .with_feature(
                Feature::new(Geometry::point(3.0, 3.0)).with_property("objectType", "door"),
            )
    }

    pub fn wall(from: (f64, f64), to: (f64, f64)) -> Feature {
        Feature::new(Geometry::line(from, to)).with_property("objectType", "wall")
    }

    /// Repository over an in-memory cache and a counting in-memory store.
    pub fn counting_repository(
        config: RepositoryConfig,
    ) -> (
        CountingRepository,
        Arc<InMemoryCache>,
        Arc<CountingStore<InMemoryDocumentStore>>,
    ) {
        let cache = Arc::new(InMemoryCache::new());
        let store = Arc::new(CountingStore::new(InMemoryDocumentStore::new()));
        let repo = LookupRepository::new(Arc::clone(&cache), Arc::clone(&store), config);
        (repo, cache, store)
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over repository results.

    use super::*;

    fn assert_kind<T: std::fmt::Debug>(result: &NavmapResult<T>, expected: ErrorKind) {
        match result {
            Err(e) => assert_eq!(e.kind(), expected, "unexpected error: {}", e),
            Ok(v) => panic!("Expected {:?}, got Ok({:?})", expected, v),
        }
    }

    pub fn assert_not_found<T: std::fmt::Debug>(result: &NavmapResult<T>) {
        assert_kind(result, ErrorKind::NotFound);
    }

    pub fn assert_store_failure<T: std::fmt::Debug>(result: &NavmapResult<T>) {
        assert_kind(result, ErrorKind::StoreFailure);
    }

    pub fn assert_timeout<T: std::fmt::Debug>(result: &NavmapResult<T>) {
        assert_kind(result, ErrorKind::Timeout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beacon_map_fixture() {
        let doc = fixtures::beacon_map(&["A", "B"]);
        let beacons: Vec<_> = doc.beacon_ids().collect();
        assert_eq!(beacons, vec![BeaconId::new("A"), BeaconId::new("B")]);
        assert_eq!(fixtures::unbeaconed_map().beacon_ids().count(), 0);
    }

    #[tokio::test]
    async fn test_flaky_cache_rejects_kind() {
        let cache = FlakyBatchCache::rejecting_kind(KeyKind::Beacon);
        let id = MapId::now_v7();
        let ttl = Duration::from_secs(30);
        let mut batch = CacheBatch::new();
        batch
            .set(CacheKey::primary(&id), b"doc".to_vec(), ttl)
            .set(CacheKey::beacon(&BeaconId::new("X")), b"ptr".to_vec(), ttl);

        let outcome = cache.execute(batch).await.unwrap();
        assert_eq!(outcome.applied, 1);
        assert_eq!(outcome.failures.len(), 1);
        assert!(cache.inner().contains(&CacheKey::primary(&id)));
    }

    #[tokio::test]
    async fn test_failing_cache_counts_calls() {
        let cache = FailingCache::new();
        assert!(cache.get(&CacheKey::primary(&MapId::now_v7())).await.is_err());
        assert!(cache.execute(CacheBatch::new()).await.is_err());
        assert_eq!(cache.calls(), 2);
    }
}
