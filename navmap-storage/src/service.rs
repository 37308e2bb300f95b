//! Deadline-bounded facade over [`LookupRepository`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use navmap_core::{BeaconId, MapDocument, MapId, NavmapError, NavmapResult};

use crate::cache::CacheBackend;
use crate::codec::{Codec, JsonCodec};
use crate::repository::LookupRepository;
use crate::store::DocumentStore;

/// Run `fut` with a deadline. On expiry the future is dropped and
/// [`NavmapError::Timeout`] is returned.
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> NavmapResult<T>
where
    F: Future<Output = NavmapResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(limit_ms = limit.as_millis() as u64, "operation deadline exceeded");
            Err(NavmapError::Timeout { limit })
        }
    }
}

/// Runs every repository operation under the configured operation timeout.
pub struct MapService<C: ?Sized, S: ?Sized, K = JsonCodec> {
    repository: Arc<LookupRepository<C, S, K>>,
    timeout: Duration,
}

impl<C, S, K> MapService<C, S, K>
where
    C: CacheBackend + ?Sized,
    S: DocumentStore + ?Sized,
    K: Codec,
{
    /// Uses the repository's `operation_timeout` as the deadline.
    pub fn new(repository: Arc<LookupRepository<C, S, K>>) -> Self {
        let timeout = repository.config().operation_timeout;
        Self {
            repository,
            timeout,
        }
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn repository(&self) -> &LookupRepository<C, S, K> {
        &self.repository
    }

    pub async fn create(&self, doc: &MapDocument) -> NavmapResult<()> {
        with_timeout(self.timeout, self.repository.create(doc)).await
    }

    pub async fn get_by_beacon(&self, beacon: &BeaconId) -> NavmapResult<MapDocument> {
        with_timeout(self.timeout, self.repository.get_by_beacon(beacon)).await
    }

    pub async fn get_by_id(&self, id: &MapId) -> NavmapResult<MapDocument> {
        with_timeout(self.timeout, self.repository.get_by_id(id)).await
    }

    pub async fn delete_by_beacon(&self, beacon: &BeaconId) -> NavmapResult<MapDocument> {
        with_timeout(self.timeout, self.repository.delete_by_beacon(beacon)).await
    }

    pub async fn get_any(&self) -> NavmapResult<MapDocument> {
        with_timeout(self.timeout, self.repository.get_any()).await
    }

    pub async fn get_by_address(&self, address: &str) -> NavmapResult<MapDocument> {
        with_timeout(self.timeout, self.repository.get_by_address(address)).await
    }
}

impl<C: ?Sized, S: ?Sized, K> Clone for MapService<C, S, K> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            timeout: self.timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::store::InMemoryDocumentStore;
    use navmap_core::{ErrorKind, Feature, RepositoryConfig};

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_expires() {
        let limit = Duration::from_millis(50);
        let err = with_timeout(limit, async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_with_timeout_passes_result_through() {
        let value = with_timeout(Duration::from_secs(1), async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);

        let err = with_timeout::<(), _>(Duration::from_secs(1), async {
            Err(NavmapError::not_found(navmap_core::Lookup::Any))
        })
        .await
        .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_service_delegates() {
        let repo = LookupRepository::new(
            Arc::new(InMemoryCache::new()),
            Arc::new(InMemoryDocumentStore::new()),
            RepositoryConfig::default().with_operation_timeout(Duration::from_secs(3)),
        );
        let service = MapService::new(Arc::new(repo));
        assert_eq!(service.timeout(), Duration::from_secs(3));

        let doc = MapDocument::new(MapId::now_v7()).with_feature(Feature::beacon("b", 0.0, 0.0));
        service.create(&doc).await.unwrap();
        assert_eq!(service.get_by_beacon(&BeaconId::new("b")).await.unwrap(), doc);
        assert_eq!(service.get_by_id(&doc.id).await.unwrap(), doc);
        assert_eq!(service.get_any().await.unwrap(), doc);
        assert_eq!(service.delete_by_beacon(&BeaconId::new("b")).await.unwrap(), doc);
        assert!(service.get_any().await.unwrap_err().is_not_found());
    }
}
