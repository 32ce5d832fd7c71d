//! Atrium Test Utilities
//!
//! Shared test infrastructure for the Atrium workspace:
//! - Fixtures for subscriptions, events and mutations
//! - Collaborators that always fail, for degradation tests
//! - Proptest generators for event types and entity references

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use atrium_core::{
    BrokerError, CacheError, DomainEvent, EntityRef, EventType, WebhookSubscription, WorkspaceId,
};
use atrium_events::BrokerClient;
use atrium_storage::CacheStore;
use serde_json::{json, Value};
use uuid::Uuid;

// Re-export core types for convenience
pub use atrium_core::{DeliveryFailure, DeliveryState, EntityKind, SubscriptionId};

/// Secret long enough to pass registration validation.
pub const TEST_SECRET: &str = "test-secret-0123456789";

// ============================================================================
// FIXTURES
// ============================================================================

/// Factory functions for common values.
pub mod fixtures {
    use super::*;

    pub fn workspace_id() -> WorkspaceId {
        Uuid::now_v7()
    }

    /// Active subscription for `event_types` pointing at `url`.
    pub fn subscription(
        workspace_id: WorkspaceId,
        url: impl Into<String>,
        event_types: &[EventType],
    ) -> WebhookSubscription {
        WebhookSubscription::new(workspace_id, url, TEST_SECRET, event_types.iter().cloned())
    }

    pub fn event(event_type: EventType, workspace_id: WorkspaceId, payload: Value) -> DomainEvent {
        match DomainEvent::new(event_type, workspace_id, payload) {
            Ok(event) => event,
            Err(e) => panic!("fixture event must be valid: {}", e),
        }
    }

    pub fn member_joined(workspace_id: WorkspaceId) -> DomainEvent {
        event(
            EventType::MEMBER_JOINED,
            workspace_id,
            json!({ "member_id": Uuid::now_v7(), "role": "viewer" }),
        )
    }

    pub fn workspace_updated(workspace_id: WorkspaceId, name: &str) -> DomainEvent {
        event(
            EventType::WORKSPACE_UPDATED,
            workspace_id,
            json!({ "workspace_id": workspace_id, "name": name }),
        )
    }
}

// ============================================================================
// FAILING COLLABORATORS
// ============================================================================

/// Cache store whose every operation fails as unavailable.
#[derive(Debug, Default)]
pub struct FailingCacheStore {
    calls: AtomicU64,
}

impl FailingCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of operations attempted against the store.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn fail<T>(&self) -> Result<T, CacheError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Err(CacheError::Unavailable {
            reason: "connection refused".to_string(),
        })
    }
}

#[async_trait]
impl CacheStore for FailingCacheStore {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.fail()
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), CacheError> {
        self.fail()
    }

    async fn delete(&self, _keys: &[String]) -> Result<u64, CacheError> {
        self.fail()
    }

    async fn purge_expired(&self) -> Result<u64, CacheError> {
        self.fail()
    }

    fn backend_name(&self) -> &'static str {
        "failing"
    }
}

/// Broker that rejects every record as unavailable.
#[derive(Debug, Default)]
pub struct FailingBroker {
    attempts: AtomicU64,
}

impl FailingBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl BrokerClient for FailingBroker {
    async fn publish(&self, _topic: &str, _partition_key: &str, _payload: Vec<u8>) -> Result<(), BrokerError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        Err(BrokerError::Unavailable {
            broker: self.name().to_string(),
            reason: "broker offline".to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

// ============================================================================
// GENERATORS
// ============================================================================

/// Proptest strategies.
pub mod generators {
    use super::*;
    use proptest::prelude::*;

    /// One of the built-in event types.
    pub fn arb_event_type() -> impl Strategy<Value = EventType> {
        prop_oneof![
            Just(EventType::WORKSPACE_CREATED),
            Just(EventType::WORKSPACE_UPDATED),
            Just(EventType::WORKSPACE_DELETED),
            Just(EventType::MEMBER_JOINED),
            Just(EventType::MEMBER_REMOVED),
            Just(EventType::MEMBER_ROLE_CHANGED),
            Just(EventType::ROLE_UPDATED),
            Just(EventType::BILLING_UPDATED),
        ]
    }

    /// An entity reference of any kind.
    pub fn arb_entity_ref() -> impl Strategy<Value = EntityRef> {
        let ws = any::<u128>().prop_map(Uuid::from_u128);
        let id = any::<u128>().prop_map(Uuid::from_u128);
        prop_oneof![
            ws.clone().prop_map(EntityRef::workspace),
            (id.clone(), ws.clone()).prop_map(|(m, w)| EntityRef::member(m, w)),
            id.clone().prop_map(EntityRef::role),
            (id, ws).prop_map(|(a, w)| EntityRef::billing_account(a, w)),
        ]
    }

    /// A flat JSON object payload.
    pub fn arb_payload() -> impl Strategy<Value = Value> {
        prop::collection::btree_map("[a-z_]{1,10}", any::<i64>(), 0..6)
            .prop_map(|m| Value::Object(m.into_iter().map(|(k, v)| (k, json!(v))).collect()))
    }
}
