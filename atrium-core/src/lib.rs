//! Atrium Core - Pipeline Data Types
//!
//! Pure data structures shared by the cache, event and webhook components of
//! the mutation side-effect pipeline. All other crates depend on this.
//! This crate performs no I/O.

pub mod config;
pub mod entity;
pub mod error;
pub mod event;
pub mod identity;
pub mod webhook;

pub use config::{
    env_parse, CacheBackendKind, CacheSettings, EventSettings, PipelineConfig, WebhookSettings,
    DEFAULT_CACHE_PURGE_INTERVAL, DEFAULT_CACHE_TTL, DEFAULT_EVENTS_TOPIC,
    DEFAULT_PUBLISH_TIMEOUT, DEFAULT_QUEUE_CAPACITY, DEFAULT_WEBHOOK_TIMEOUT,
};
pub use entity::{EntityKind, EntityRef};
pub use error::{
    AtriumError, AtriumResult, BrokerError, CacheError, ConfigError, StorageError,
    ValidationError,
};
pub use event::{DomainEvent, EventType};
pub use identity::{new_entity_id, EntityId, SubscriptionId, Timestamp, WorkspaceId};
pub use webhook::{DeliveryFailure, DeliveryState, WebhookSubscription};
