//! Error types for Atrium operations

use thiserror::Error;
use uuid::Uuid;

/// Subscription storage errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Subscription not found: {id}")]
    SubscriptionNotFound { id: Uuid },

    #[error("Subscription already exists: {id}")]
    AlreadyExists { id: Uuid },

    #[error("Storage backend failed during {operation}: {reason}")]
    Backend { operation: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Cache store errors.
///
/// These are always recovered locally by the cache manager; they never
/// reach the mutation path.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Cache serialization failed for {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Cache backend error: {reason}")]
    Backend { reason: String },
}

/// Message broker errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    #[error("Broker {broker} unavailable: {reason}")]
    Unavailable { broker: String, reason: String },

    #[error("Broker rejected record for topic {topic}: {reason}")]
    Rejected { topic: String, reason: String },
}

/// Validation errors. These indicate a defect in the caller, not an
/// external fault, and are raised at the point of construction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Invalid event type {value:?}: {reason}")]
    InvalidEventType { value: String, reason: String },

    #[error("Event payload must be a JSON object, got {found}")]
    PayloadNotObject { found: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all Atrium errors.
#[derive(Debug, Clone, Error)]
pub enum AtriumError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl AtriumError {
    /// Returns true for infrastructure faults that callers recover from
    /// locally (cache or broker unavailable).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AtriumError::Cache(_)
                | AtriumError::Broker(_)
                | AtriumError::Storage(StorageError::Backend { .. })
        )
    }
}

/// Result type alias for Atrium operations.
pub type AtriumResult<T> = Result<T, AtriumError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display_not_found() {
        let err = StorageError::SubscriptionNotFound { id: Uuid::nil() };
        let msg = format!("{}", err);
        assert!(msg.contains("Subscription not found"));
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::PayloadNotObject {
            found: "array".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Event payload must be a JSON object, got array"
        );
    }

    #[test]
    fn test_master_error_from_conversions() {
        let err: AtriumError = CacheError::Unavailable {
            reason: "connection refused".to_string(),
        }
        .into();
        assert!(matches!(err, AtriumError::Cache(_)));
        assert!(err.is_transient());

        let err: AtriumError = ValidationError::RequiredFieldMissing {
            field: "url".to_string(),
        }
        .into();
        assert!(!err.is_transient());
        assert!(err.to_string().starts_with("Validation error:"));
    }

    #[test]
    fn test_broker_errors_are_transient() {
        let err: AtriumError = BrokerError::Unavailable {
            broker: "memory".to_string(),
            reason: "closed".to_string(),
        }
        .into();
        assert!(err.is_transient());
    }
}
