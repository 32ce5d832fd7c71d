//! Cache consistency manager.
//!
//! Read-through caching with TTL-bounded staleness. Writers only delete: a
//! mutation removes every key in the entity's [`InvalidationGroup`] and the
//! next read repopulates from the system of record.
//!
//! Store failures never escape this type. Reads degrade to a miss, writes
//! and deletes are logged and dropped, and any stale leftover expires with
//! its TTL.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use atrium_core::{CacheError, CacheSettings, EntityRef, DEFAULT_CACHE_TTL};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::key::{CacheKey, InvalidationGroup};
use super::traits::{CacheStats, CacheStore, StatsCounters};

/// Configuration for the cache manager.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL applied when `put` is called without one.
    pub default_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default entry TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }
}

impl From<&CacheSettings> for CacheConfig {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            default_ttl: settings.default_ttl,
        }
    }
}

/// Outcome of one invalidation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationReport {
    /// Encoded keys that were submitted for deletion.
    pub keys: Vec<String>,
    /// Entries that existed and were removed.
    pub deleted: u64,
    /// Store error, if the delete failed. The keys may still be present.
    pub error: Option<String>,
}

impl InvalidationReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Owns all access to the cache store.
#[derive(Clone)]
pub struct CacheConsistencyManager {
    store: Arc<dyn CacheStore>,
    config: CacheConfig,
    stats: Arc<StatsCounters>,
}

impl std::fmt::Debug for CacheConsistencyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheConsistencyManager")
            .field("backend", &self.store.backend_name())
            .field("config", &self.config)
            .finish()
    }
}

impl CacheConsistencyManager {
    pub fn new(store: Arc<dyn CacheStore>, config: CacheConfig) -> Self {
        Self {
            store,
            config,
            stats: Arc::new(StatsCounters::default()),
        }
    }

    pub fn with_defaults(store: Arc<dyn CacheStore>) -> Self {
        Self::new(store, CacheConfig::default())
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Serialize and store `value`. Overwrites reset the TTL clock.
    ///
    /// Returns whether the value was stored; a failure is logged and
    /// otherwise ignored.
    pub async fn put<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: Option<Duration>) -> bool {
        let encoded = key.encode();
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.stats.error();
                let err = CacheError::Serialization {
                    key: encoded,
                    reason: e.to_string(),
                };
                tracing::warn!(error = %err, "cache put skipped");
                return false;
            }
        };

        let ttl = ttl.unwrap_or(self.config.default_ttl);
        match self.store.set(&encoded, bytes, ttl).await {
            Ok(()) => true,
            Err(e) => {
                self.stats.error();
                tracing::warn!(
                    key = %encoded,
                    backend = self.store.backend_name(),
                    error = %e,
                    "cache put failed"
                );
                false
            }
        }
    }

    /// Look up `key`. Absent, expired, undecodable and unreachable all read
    /// as `None`.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let encoded = key.encode();
        let bytes = match self.store.get(&encoded).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                self.stats.miss();
                return None;
            }
            Err(e) => {
                self.stats.miss();
                self.stats.error();
                tracing::warn!(
                    key = %encoded,
                    backend = self.store.backend_name(),
                    error = %e,
                    "cache get failed, treating as miss"
                );
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                self.stats.hit();
                Some(value)
            }
            Err(e) => {
                self.stats.miss();
                self.stats.error();
                tracing::warn!(key = %encoded, error = %e, "cached value undecodable, treating as miss");
                None
            }
        }
    }

    /// Read-through lookup.
    ///
    /// On a miss the loader is called; a loaded value is stored with the
    /// default TTL. Loader errors propagate, cache errors do not.
    pub async fn get_or_load<T, E, F, Fut>(&self, key: &CacheKey, loader: F) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        if let Some(cached) = self.get(key).await {
            return Ok(Some(cached));
        }

        let loaded = loader().await?;
        if let Some(value) = &loaded {
            self.put(key, value, None).await;
        }
        Ok(loaded)
    }

    /// Remove every key derived from `entity`.
    pub async fn invalidate_group(&self, entity: &EntityRef) -> InvalidationReport {
        self.invalidate_keys(&InvalidationGroup::for_entity(entity))
            .await
    }

    /// Remove the entity's group plus caller-supplied extra keys in one
    /// delete call.
    pub async fn invalidate(
        &self,
        entity: &EntityRef,
        extra: impl IntoIterator<Item = CacheKey>,
    ) -> InvalidationReport {
        let group = InvalidationGroup::for_entity(entity).with_keys(extra);
        self.invalidate_keys(&group).await
    }

    /// Remove an explicit set of keys in one delete call.
    pub async fn invalidate_keys(&self, group: &InvalidationGroup) -> InvalidationReport {
        let keys = group.encoded();
        if keys.is_empty() {
            return InvalidationReport {
                keys,
                deleted: 0,
                error: None,
            };
        }

        match self.store.delete(&keys).await {
            Ok(deleted) => {
                self.stats.invalidated(deleted);
                tracing::debug!(keys = ?keys, deleted, "cache keys invalidated");
                InvalidationReport {
                    keys,
                    deleted,
                    error: None,
                }
            }
            Err(e) => {
                self.stats.error();
                tracing::warn!(
                    keys = ?keys,
                    backend = self.store.backend_name(),
                    error = %e,
                    "cache invalidation failed, entries will expire at TTL"
                );
                InvalidationReport {
                    keys,
                    deleted: 0,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Remove expired entries that were never read back. Returns how many
    /// were removed; a store failure counts as zero.
    pub async fn purge_expired(&self) -> u64 {
        match self.store.purge_expired().await {
            Ok(purged) => {
                if purged > 0 {
                    tracing::debug!(backend = self.store.backend_name(), purged, "expired cache entries purged");
                }
                purged
            }
            Err(e) => {
                self.stats.error();
                tracing::warn!(
                    backend = self.store.backend_name(),
                    error = %e,
                    "cache purge failed"
                );
                0
            }
        }
    }

    /// Spawn a task that calls [`purge_expired`](Self::purge_expired) every
    /// `every`, starting one period from now. The task runs until aborted.
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + every;
            let mut ticker = tokio::time::interval_at(start, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                cache.purge_expired().await;
            }
        })
    }
}
