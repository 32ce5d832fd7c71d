//! Cache store trait and statistics.
//!
//! A [`CacheStore`] is any key-value store with per-entry TTL support. The
//! cache manager is the only caller; business logic never touches a store
//! directly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use atrium_core::CacheError;

/// Pluggable key-value store with TTL support.
///
/// Implementations must be safe for concurrent `get`/`delete` from many
/// request tasks without client-side locking. Correctness relies on the
/// store's own atomicity for single-key writes and deletes.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read the raw bytes stored under `key`. Expired entries are absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store `value` under `key`, replacing any existing entry and
    /// restarting its TTL clock.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    /// Delete every listed key. Returns how many entries existed.
    async fn delete(&self, keys: &[String]) -> Result<u64, CacheError>;

    /// Remove every expired entry, read or not. Returns how many were
    /// removed.
    async fn purge_expired(&self) -> Result<u64, CacheError>;

    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;
}

/// Snapshot of cache manager counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses (including store failures).
    pub misses: u64,
    /// Number of store operations that failed and were swallowed.
    pub errors: u64,
    /// Number of keys removed by invalidation.
    pub invalidated: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Lock-free counters backing [`CacheStats`].
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    invalidated: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn invalidated(&self, count: u64) {
        self.invalidated.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            invalidated: self.invalidated.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);

        let empty_stats = CacheStats::default();
        assert!((empty_stats.hit_rate() - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_counters_snapshot() {
        let counters = StatsCounters::default();
        counters.hit();
        counters.miss();
        counters.miss();
        counters.invalidated(3);

        let stats = counters.snapshot();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.invalidated, 3);
        assert_eq!(stats.errors, 0);
    }
}
