//! Delivery attempt bookkeeping.

use std::time::{Duration, Instant};

use atrium_core::{DeliveryFailure, DeliveryState, EventType, SubscriptionId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outcome of a successful delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DeliveryReceipt {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub subscription_id: SubscriptionId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, example = "member.joined"))]
    pub event_type: EventType,
    /// HTTP status returned by the endpoint (always < 400)
    pub status: u16,
    /// Hex signature sent in `X-Webhook-Signature`
    pub signature: String,
    pub elapsed_ms: u64,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub delivered_at: Timestamp,
}

impl DeliveryReceipt {
    pub fn state(&self) -> DeliveryState {
        DeliveryState::Sent { status: self.status }
    }
}

/// A failed delivery, with the subscription it was addressed to.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("delivery to subscription {subscription_id} failed: {failure}")]
pub struct DeliveryError {
    pub subscription_id: SubscriptionId,
    pub event_type: EventType,
    pub failure: DeliveryFailure,
    pub elapsed_ms: u64,
}

impl DeliveryError {
    pub fn state(&self) -> DeliveryState {
        DeliveryState::Failed {
            failure: self.failure.clone(),
        }
    }
}

/// Terminal state reached by a finished delivery.
pub fn outcome_state(outcome: &Result<DeliveryReceipt, DeliveryError>) -> DeliveryState {
    match outcome {
        Ok(receipt) => receipt.state(),
        Err(err) => err.state(),
    }
}

/// One in-flight delivery. Consumed when it is sent or fails, so the
/// terminal [`DeliveryState`] lives on the returned receipt or error.
#[derive(Debug)]
pub(crate) struct DeliveryAttempt {
    subscription_id: SubscriptionId,
    event_type: EventType,
    signature: String,
    started: Instant,
}

impl DeliveryAttempt {
    pub(crate) fn start(
        subscription_id: SubscriptionId,
        event_type: EventType,
        signature: String,
    ) -> Self {
        Self {
            subscription_id,
            event_type,
            signature,
            started: Instant::now(),
        }
    }

    pub(crate) fn event_type(&self) -> &EventType {
        &self.event_type
    }

    /// Finish the attempt with the endpoint's response status.
    ///
    /// Any status below 400 counts as delivered.
    pub(crate) fn responded(self, status: u16) -> Result<DeliveryReceipt, DeliveryError> {
        if status < 400 {
            self.sent(status)
        } else {
            self.failed(DeliveryFailure::Status { status })
        }
    }

    fn sent(self, status: u16) -> Result<DeliveryReceipt, DeliveryError> {
        Ok(DeliveryReceipt {
            subscription_id: self.subscription_id,
            event_type: self.event_type,
            status,
            signature: self.signature,
            elapsed_ms: millis(self.started.elapsed()),
            delivered_at: Utc::now(),
        })
    }

    pub(crate) fn failed(self, failure: DeliveryFailure) -> Result<DeliveryReceipt, DeliveryError> {
        Err(DeliveryError {
            subscription_id: self.subscription_id,
            event_type: self.event_type,
            failure,
            elapsed_ms: millis(self.started.elapsed()),
        })
    }
}

fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Map a transport error onto a delivery failure.
pub(crate) fn classify(err: &reqwest::Error) -> DeliveryFailure {
    if err.is_timeout() {
        DeliveryFailure::Timeout
    } else if err.is_builder() {
        DeliveryFailure::InvalidUrl {
            message: err.to_string(),
        }
    } else {
        DeliveryFailure::Connection {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn attempt() -> DeliveryAttempt {
        DeliveryAttempt::start(Uuid::now_v7(), EventType::MEMBER_JOINED, "ab12".into())
    }

    #[test]
    fn test_outcome_carries_terminal_state() {
        let sent = attempt().responded(204);
        assert_eq!(outcome_state(&sent), DeliveryState::Sent { status: 204 });
        assert!(outcome_state(&sent).is_success());

        let failed = attempt().responded(503);
        let state = outcome_state(&failed);
        assert_eq!(
            state,
            DeliveryState::Failed {
                failure: DeliveryFailure::Status { status: 503 }
            }
        );
        assert!(state.is_terminal());
        assert_eq!(state.label(), "failure");

        let timed_out = attempt().failed(DeliveryFailure::Timeout);
        assert!(!outcome_state(&timed_out).is_success());
    }

    #[test]
    fn test_redirect_status_counts_as_sent() {
        let receipt = attempt().responded(302).unwrap();
        assert_eq!(receipt.status, 302);
        assert_eq!(receipt.signature, "ab12");
    }

    #[test]
    fn test_error_status_is_failure() {
        for status in [400, 404, 500, 503] {
            let err = attempt().responded(status).unwrap_err();
            assert_eq!(err.failure, DeliveryFailure::Status { status });
        }
    }

    #[test]
    fn test_error_display_names_reason() {
        let err = attempt().failed(DeliveryFailure::Timeout).unwrap_err();
        assert!(err.to_string().contains("did not respond"));
    }
}
