//! Repository configuration
//!
//! Loaded from environment variables with development defaults, then checked
//! with [`RepositoryConfig::validate`] before a repository is built.

use std::time::Duration;

use crate::error::ConfigError;

/// Default cache entry lifetime in minutes.
pub const DEFAULT_CACHE_EXPIRY_MINUTES: u64 = 10;

/// Default collection (table) holding map documents.
pub const DEFAULT_COLLECTION: &str = "maps";

/// Default per-operation deadline in seconds.
pub const DEFAULT_CONTEXT_TIMEOUT_SECS: u64 = 2;

/// Settings shared by the lookup repository and the service wrapping it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryConfig {
    /// Lifetime of both primary and indirection cache entries.
    pub cache_ttl: Duration,
    /// Name of the collection the store keeps maps in.
    pub collection: String,
    /// Deadline applied to each service operation.
    pub operation_timeout: Duration,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_EXPIRY_MINUTES * 60),
            collection: DEFAULT_COLLECTION.to_string(),
            operation_timeout: Duration::from_secs(DEFAULT_CONTEXT_TIMEOUT_SECS),
        }
    }
}

impl RepositoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config from environment variables.
    ///
    /// Environment variables:
    /// - `NAVMAP_CACHE_EXPIRY_MINUTES`: cache entry lifetime (default: 10)
    /// - `NAVMAP_COLLECTION`: collection name (default: "maps")
    /// - `NAVMAP_CONTEXT_TIMEOUT_SECS`: per-operation deadline (default: 2)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let cache_expiry_minutes = lookup("NAVMAP_CACHE_EXPIRY_MINUTES")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(DEFAULT_CACHE_EXPIRY_MINUTES);

        let collection = lookup("NAVMAP_COLLECTION")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_COLLECTION.to_string());

        let timeout_secs = lookup("NAVMAP_CONTEXT_TIMEOUT_SECS")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(DEFAULT_CONTEXT_TIMEOUT_SECS);

        Self {
            cache_ttl: Duration::from_secs(cache_expiry_minutes * 60),
            collection,
            operation_timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Reject values no backend can work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_ttl.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "cache_ttl".to_string(),
                value: format!("{:?}", self.cache_ttl),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.operation_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "operation_timeout".to_string(),
                value: format!("{:?}", self.operation_timeout),
                reason: "must be greater than zero".to_string(),
            });
        }
        validate_identifier("collection", &self.collection)
    }
}

/// Check that `value` is a plain SQL-style identifier.
///
/// Collection names end up inside statements the store builds, so only
/// `[A-Za-z_][A-Za-z0-9_]*` is accepted.
pub fn validate_identifier(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::MissingRequired {
            field: field.to_string(),
        });
    }
    let mut chars = value.chars();
    let head_ok = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    if !head_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: "must match [A-Za-z_][A-Za-z0-9_]*".to_string(),
        });
    }
    Ok(())
}
