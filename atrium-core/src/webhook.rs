//! Webhook subscription records and delivery outcomes.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

use crate::event::{DomainEvent, EventType};
use crate::identity::{new_entity_id, SubscriptionId, Timestamp, WorkspaceId};

/// A subscriber endpoint registered by a workspace administrator.
///
/// Consumed read-only by the dispatcher. The failure counter, success counter
/// and last-triggered timestamp are only ever changed by the subscription
/// store's atomic update operations.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookSubscription {
    pub id: SubscriptionId,
    pub workspace_id: WorkspaceId,
    /// Target URL for webhook delivery
    pub url: String,
    /// Shared secret for HMAC signatures (never serialized)
    #[serde(skip_serializing, default)]
    pub secret: String,
    /// Event types this subscription receives (exact match)
    pub event_types: BTreeSet<EventType>,
    pub active: bool,
    /// Consecutive failed deliveries since the last success
    pub failure_count: u64,
    /// Total successful deliveries
    pub success_count: u64,
    pub last_triggered_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl WebhookSubscription {
    /// Create a new active subscription with zeroed counters.
    pub fn new(
        workspace_id: WorkspaceId,
        url: impl Into<String>,
        secret: impl Into<String>,
        event_types: impl IntoIterator<Item = EventType>,
    ) -> Self {
        Self {
            id: new_entity_id(),
            workspace_id,
            url: url.into(),
            secret: secret.into(),
            event_types: event_types.into_iter().collect(),
            active: true,
            failure_count: 0,
            success_count: 0,
            last_triggered_at: None,
            created_at: Utc::now(),
        }
    }

    /// Mark the subscription inactive.
    pub fn deactivated(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn subscribes_to(&self, event_type: &EventType) -> bool {
        self.event_types.contains(event_type)
    }

    /// True when this subscription should receive `event`: active, same
    /// workspace, and the event type is in its set.
    pub fn matches(&self, event: &DomainEvent) -> bool {
        self.active
            && self.workspace_id == event.workspace_id()
            && self.subscribes_to(event.event_type())
    }
}

impl fmt::Debug for WebhookSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookSubscription")
            .field("id", &self.id)
            .field("workspace_id", &self.workspace_id)
            .field("url", &self.url)
            .field("secret", &"[REDACTED]")
            .field("event_types", &self.event_types)
            .field("active", &self.active)
            .field("failure_count", &self.failure_count)
            .field("success_count", &self.success_count)
            .field("last_triggered_at", &self.last_triggered_at)
            .field("created_at", &self.created_at)
            .finish()
    }
}

// ============================================================================
// DELIVERY OUTCOMES
// ============================================================================

/// Why a single delivery attempt failed.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DeliveryFailure {
    #[error("endpoint responded with status {status}")]
    Status { status: u16 },

    #[error("endpoint did not respond within the delivery timeout")]
    Timeout,

    #[error("connection failed: {message}")]
    Connection { message: String },

    #[error("invalid endpoint url: {message}")]
    InvalidUrl { message: String },

    #[error("payload could not be serialized: {message}")]
    Payload { message: String },
}

/// State of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeliveryState {
    Pending,
    Sent { status: u16 },
    Failed { failure: DeliveryFailure },
}

impl DeliveryState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DeliveryState::Pending)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DeliveryState::Sent { .. })
    }

    /// Label used for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            DeliveryState::Pending => "pending",
            DeliveryState::Sent { .. } => "success",
            DeliveryState::Failed { .. } => "failure",
        }
    }
}
