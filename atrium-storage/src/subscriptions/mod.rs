//! Webhook subscription storage.
//!
//! The dispatcher reads subscriptions and reports delivery outcomes through
//! [`SubscriptionStore`]. Counter updates are single store-side operations;
//! callers never read a counter, change it in memory and write it back.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use atrium_core::{EventType, StorageError, SubscriptionId, Timestamp, WebhookSubscription, WorkspaceId};

pub use memory::InMemorySubscriptionStore;
pub use postgres::{PgStoreConfig, PgSubscriptionStore, SCHEMA};

/// Registry of webhook subscriptions.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Register a subscription. Fails if the id is already taken.
    async fn insert(&self, subscription: WebhookSubscription) -> Result<(), StorageError>;

    async fn get(&self, id: SubscriptionId) -> Result<Option<WebhookSubscription>, StorageError>;

    /// Remove a subscription, returning it if it existed.
    async fn remove(&self, id: SubscriptionId) -> Result<Option<WebhookSubscription>, StorageError>;

    /// All subscriptions of a workspace, oldest first.
    async fn list(&self, workspace_id: WorkspaceId) -> Result<Vec<WebhookSubscription>, StorageError>;

    /// Active subscriptions of `workspace_id` whose event-type set contains
    /// `event_type`.
    async fn matching(
        &self,
        workspace_id: WorkspaceId,
        event_type: &EventType,
    ) -> Result<Vec<WebhookSubscription>, StorageError>;

    /// Reset the failure counter, bump the success counter and set
    /// last-triggered, in one atomic update.
    async fn record_success(&self, id: SubscriptionId, at: Timestamp) -> Result<(), StorageError>;

    /// Increment the failure counter atomically. Returns the new value.
    async fn record_failure(&self, id: SubscriptionId) -> Result<u64, StorageError>;

    async fn set_active(&self, id: SubscriptionId, active: bool) -> Result<(), StorageError>;

    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;
}
