//! Error types for event publication.

use atrium_core::BrokerError;
use thiserror::Error;

/// Errors that can occur while publishing a domain event.
#[derive(Debug, Error)]
pub enum EventError {
    /// Failed to serialize the event body.
    #[error("Failed to serialize event type {event_type}: {cause}")]
    Serialization { event_type: String, cause: String },

    /// The broker refused or could not accept the record.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// The broker did not answer within the publish timeout.
    #[error("Publish to {topic} timed out after {after_ms} ms")]
    Timeout { topic: String, after_ms: u64 },

    /// The publish queue is at capacity; the event was dropped.
    #[error("Publish queue full, dropped event type {event_type}")]
    QueueFull { event_type: String },

    /// The publish worker has stopped.
    #[error("Publish queue closed")]
    QueueClosed,
}

impl EventError {
    /// Returns true if a later attempt could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EventError::Broker(BrokerError::Unavailable { .. })
                | EventError::Timeout { .. }
                | EventError::QueueFull { .. }
        )
    }
}
