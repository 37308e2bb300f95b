//! Cache layer: typed keys, the backend trait and its implementations.
//!
//! The cache is an accelerator only. Every backend may fail at any time and
//! the repository in front of it must still return correct documents, so
//! backends report errors plainly and leave containment to the caller.
//!
//! Backends:
//! - [`InMemoryCache`]: process-local, driven by the tokio clock
//! - [`LmdbCache`]: persistent single-node cache on LMDB
//! - `RedisCache`: shared cache, behind the `redis` feature

pub mod keys;
pub mod lmdb_backend;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_backend;
pub mod traits;

pub use keys::{CacheKey, KeyKind};
pub use lmdb_backend::{LmdbCache, LmdbCacheConfig, LmdbCacheError};
pub use memory::InMemoryCache;
#[cfg(feature = "redis")]
pub use redis_backend::{RedisCache, RedisCacheConfig};
pub use traits::{BatchOutcome, CacheBackend, CacheBatch, CacheOp};
