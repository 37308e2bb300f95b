//! navmap storage - two-tier map document lookup
//!
//! A [`LookupRepository`] fronts a durable [`DocumentStore`] with a
//! [`CacheBackend`]. Maps are found by the beacon ids embedded in their
//! features; the cache holds each document once under its primary key plus
//! one small indirection entry per beacon.
//!
//! Backends: in-memory and LMDB caches always, Redis behind the `redis`
//! feature; in-memory store always, PostgreSQL behind the `postgres` feature.

pub mod cache;
pub mod codec;
pub mod metrics;
pub mod repository;
pub mod service;
pub mod store;

pub use cache::{
    BatchOutcome, CacheBackend, CacheBatch, CacheKey, CacheOp, InMemoryCache, KeyKind, LmdbCache,
    LmdbCacheConfig, LmdbCacheError,
};
#[cfg(feature = "redis")]
pub use cache::{RedisCache, RedisCacheConfig};
pub use codec::{Codec, JsonCodec};
pub use metrics::{CacheMetrics, CacheMetricsSnapshot};
pub use repository::LookupRepository;
pub use service::{with_timeout, MapService};
#[cfg(feature = "postgres")]
pub use store::{PostgresDocumentStore, PostgresStoreConfig};
pub use store::{
    DocumentFilter, DocumentStore, ElementMatch, IndexKind, IndexSpec, InMemoryDocumentStore,
    FEATURES_FIELD,
};
