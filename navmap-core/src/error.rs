//! Error types for navmap operations
//!
//! Repository operations return exactly one of four kinds: not found, store
//! failure, cache failure or timeout. Cache failures are contained inside the
//! repository and never reach its callers; the variant exists so backends and
//! the metrics hook share one vocabulary.

use std::time::Duration;
use thiserror::Error;

use crate::identity::{BeaconId, MapId};

/// What a failed lookup was looking for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Beacon(BeaconId),
    Id(MapId),
    Address(String),
    Any,
}

impl std::fmt::Display for Lookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lookup::Beacon(id) => write!(f, "beacon {}", id),
            Lookup::Id(id) => write!(f, "id {}", id),
            Lookup::Address(address) => write!(f, "address {:?}", address),
            Lookup::Any => f.write_str("any map"),
        }
    }
}

/// Durable document store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store connection failed: {reason}")]
    Connection { reason: String },

    #[error("Store query failed: {reason}")]
    Query { reason: String },

    #[error("Map {id} already exists")]
    DuplicateId { id: MapId },

    #[error("Index error on {index_name}: {reason}")]
    Index { index_name: String, reason: String },

    #[error("Document serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Volatile cache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache connection failed: {reason}")]
    Connection { reason: String },

    #[error("Cache backend error: {reason}")]
    Backend { reason: String },

    #[error("Codec error: {reason}")]
    Codec { reason: String },

    #[error("Invalid cache key: {key}")]
    InvalidKey { key: String },

    #[error("Cache lock poisoned")]
    LockPoisoned,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for repository and service operations.
#[derive(Debug, Clone, Error)]
pub enum NavmapError {
    #[error("Map not found for {lookup}")]
    NotFound { lookup: Lookup },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Operation timed out after {limit:?}")]
    Timeout { limit: Duration },
}

/// Coarse classification a boundary layer can map deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    StoreFailure,
    CacheFailure,
    Timeout,
}

impl NavmapError {
    pub fn not_found(lookup: Lookup) -> Self {
        Self::NotFound { lookup }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Store(_) => ErrorKind::StoreFailure,
            Self::Cache(_) => ErrorKind::CacheFailure,
            Self::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Codec {
            reason: err.to_string(),
        }
    }
}

/// Result type alias for navmap operations.
pub type NavmapResult<T> = Result<T, NavmapError>;

/// Result type alias for store backends.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type alias for cache backends.
pub type CacheResult<T> = Result<T, CacheError>;
