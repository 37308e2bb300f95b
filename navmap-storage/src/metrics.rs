//! Cache effectiveness counters for the lookup repository.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for cache traffic and contained cache failures.
///
/// Failures counted here never reach callers; these counters are the only
/// place they surface besides the logs.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    /// Reads answered from the cache
    pub hits: AtomicU64,
    /// Reads that fell through to the store
    pub misses: AtomicU64,
    /// Cache reads that failed (backend or decode) and were treated as misses
    pub read_failures: AtomicU64,
    /// Cache writes that failed after a successful store operation
    pub write_failures: AtomicU64,
    /// Cache deletes that failed after a successful store delete
    pub invalidation_failures: AtomicU64,
    /// Store queries issued by read paths
    pub store_fetches: AtomicU64,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read_failure(&self) {
        self.read_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failures(&self, count: u64) {
        self.write_failures.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_invalidation_failures(&self, count: u64) {
        self.invalidation_failures.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_store_fetch(&self) {
        self.store_fetches.fetch_add(1, Ordering::Relaxed);
    }

    /// Current values of all counters.
    pub fn snapshot(&self) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            invalidation_failures: self.invalidation_failures.load(Ordering::Relaxed),
            store_fetches: self.store_fetches.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`CacheMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub read_failures: u64,
    pub write_failures: u64,
    pub invalidation_failures: u64,
    pub store_fetches: u64,
}

impl CacheMetricsSnapshot {
    /// Fraction of reads served from the cache, 0.0 when there were none.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// All contained cache failures.
    pub fn cache_failures(&self) -> u64 {
        self.read_failures + self.write_failures + self.invalidation_failures
    }
}
