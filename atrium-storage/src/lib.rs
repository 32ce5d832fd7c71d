//! Atrium Storage - Cache and Subscription Storage
//!
//! Holds the two stateful collaborators of the side-effect pipeline:
//!
//! - [`cache`]: the cache consistency manager over a pluggable
//!   [`CacheStore`] (in-memory or LMDB).
//! - [`subscriptions`]: the webhook subscription registry over a pluggable
//!   [`SubscriptionStore`] (in-memory or PostgreSQL).

pub mod cache;
pub mod subscriptions;

pub use cache::{
    open_store, CacheConfig, CacheConsistencyManager, CacheKey, CacheStats, CacheStore,
    InMemoryCacheStore, InvalidationGroup, InvalidationReport, LmdbCacheError, LmdbCacheStore,
};
pub use subscriptions::{
    InMemorySubscriptionStore, PgStoreConfig, PgSubscriptionStore, SubscriptionStore, SCHEMA,
};
