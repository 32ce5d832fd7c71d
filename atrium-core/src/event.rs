//! Domain events emitted after committed mutations.
//!
//! A [`DomainEvent`] is created once per mutation and never modified. Its wire
//! form is the payload object with `type` and `timestamp` added, which is the
//! exact body published to the broker and POSTed to webhook subscribers.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::fmt;

use crate::error::ValidationError;
use crate::identity::{Timestamp, WorkspaceId};

// ============================================================================
// EVENT TYPE
// ============================================================================

/// Dot-separated event type, e.g. `workspace.created`.
///
/// At least two segments; every segment is non-empty and made of
/// `[a-z0-9_]`. Subscription matching is exact string equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventType(Cow<'static, str>);

impl EventType {
    pub const WORKSPACE_CREATED: EventType = EventType::from_static("workspace.created");
    pub const WORKSPACE_UPDATED: EventType = EventType::from_static("workspace.updated");
    pub const WORKSPACE_DELETED: EventType = EventType::from_static("workspace.deleted");
    pub const MEMBER_JOINED: EventType = EventType::from_static("member.joined");
    pub const MEMBER_REMOVED: EventType = EventType::from_static("member.removed");
    pub const MEMBER_ROLE_CHANGED: EventType = EventType::from_static("member.role_changed");
    pub const ROLE_UPDATED: EventType = EventType::from_static("role.updated");
    pub const BILLING_UPDATED: EventType = EventType::from_static("billing.updated");
    pub const WEBHOOK_TEST: EventType = EventType::from_static("webhook.test");

    /// Build an event type from a literal.
    ///
    /// # Panics
    ///
    /// Panics if the literal is malformed. In a `const` context this is a
    /// compile error.
    pub const fn from_static(value: &'static str) -> Self {
        if !is_valid_event_type(value.as_bytes()) {
            panic!("malformed event type literal");
        }
        Self(Cow::Borrowed(value))
    }

    /// Parse an event type from dynamic input.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        if is_valid_event_type(value.as_bytes()) {
            Ok(Self(Cow::Owned(value.to_string())))
        } else {
            Err(ValidationError::InvalidEventType {
                value: value.to_string(),
                reason: "expected lowercase dot-separated segments like `workspace.created`"
                    .to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The leading segment, e.g. `workspace` for `workspace.created`.
    pub fn namespace(&self) -> &str {
        self.0.split('.').next().unwrap_or_default()
    }
}

const fn is_valid_event_type(bytes: &[u8]) -> bool {
    let mut i = 0;
    let mut segment_len = 0;
    let mut segments = 1;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'.' {
            if segment_len == 0 {
                return false;
            }
            segments += 1;
            segment_len = 0;
        } else if b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' {
            segment_len += 1;
        } else {
            return false;
        }
        i += 1;
    }
    segment_len > 0 && segments >= 2
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for EventType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        EventType::parse(&raw).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// DOMAIN EVENT
// ============================================================================

/// Structured event describing one committed mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainEvent {
    event_type: EventType,
    workspace_id: WorkspaceId,
    partition_key: String,
    payload: Map<String, Value>,
    emitted_at: Timestamp,
}

impl DomainEvent {
    /// Create an event for a workspace, partitioned by the workspace id.
    ///
    /// Fails if `payload` is not a JSON object.
    pub fn new(
        event_type: EventType,
        workspace_id: WorkspaceId,
        payload: Value,
    ) -> Result<Self, ValidationError> {
        let payload = match payload {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(ValidationError::PayloadNotObject {
                    found: json_kind(&other).to_string(),
                })
            }
        };

        Ok(Self {
            event_type,
            workspace_id,
            partition_key: workspace_id.to_string(),
            payload,
            emitted_at: Utc::now(),
        })
    }

    /// Override the partition key (defaults to the workspace id).
    pub fn with_partition_key(
        mut self,
        partition_key: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let partition_key = partition_key.into();
        if partition_key.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "partition_key".to_string(),
            });
        }
        self.partition_key = partition_key;
        Ok(self)
    }

    /// Override the emission timestamp.
    pub fn with_emitted_at(mut self, emitted_at: Timestamp) -> Self {
        self.emitted_at = emitted_at;
        self
    }

    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    pub fn workspace_id(&self) -> WorkspaceId {
        self.workspace_id
    }

    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    pub fn emitted_at(&self) -> Timestamp {
        self.emitted_at
    }

    /// The wire object: payload fields plus `type` and `timestamp` when the
    /// payload does not already carry them.
    pub fn to_json(&self) -> Value {
        let mut body = self.payload.clone();
        body.entry("type")
            .or_insert_with(|| Value::String(self.event_type.to_string()));
        body.entry("timestamp").or_insert_with(|| {
            Value::String(self.emitted_at.to_rfc3339_opts(SecondsFormat::Millis, true))
        });
        Value::Object(body)
    }

    /// Serialize the wire object to bytes. Signatures are computed over
    /// exactly these bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.to_json())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn test_event_type_constants() {
        assert_eq!(EventType::WORKSPACE_CREATED.as_str(), "workspace.created");
        assert_eq!(EventType::MEMBER_JOINED.namespace(), "member");
    }

    #[test]
    fn test_event_type_parse_rejects_malformed() {
        for bad in ["", "workspace", ".created", "workspace.", "Workspace.Created", "a..b", "a b.c"] {
            assert!(EventType::parse(bad).is_err(), "{bad:?} should be rejected");
        }
        assert!(EventType::parse("billing.invoice.paid").is_ok());
    }

    #[test]
    fn test_event_type_serde() {
        let json = serde_json::to_string(&EventType::MEMBER_ROLE_CHANGED).unwrap();
        assert_eq!(json, "\"member.role_changed\"");

        let parsed: EventType = serde_json::from_str("\"workspace.updated\"").unwrap();
        assert_eq!(parsed, EventType::WORKSPACE_UPDATED);

        assert!(serde_json::from_str::<EventType>("\"not valid\"").is_err());
    }

    #[test]
    fn test_domain_event_rejects_non_object_payload() {
        let err = DomainEvent::new(EventType::WORKSPACE_UPDATED, Uuid::now_v7(), json!([1, 2]))
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::PayloadNotObject {
                found: "array".to_string()
            }
        );
    }

    #[test]
    fn test_domain_event_defaults_partition_key_to_workspace() {
        let ws = Uuid::now_v7();
        let event = DomainEvent::new(EventType::WORKSPACE_CREATED, ws, json!({})).unwrap();
        assert_eq!(event.partition_key(), ws.to_string());

        let event = event.with_partition_key("custom").unwrap();
        assert_eq!(event.partition_key(), "custom");
    }

    #[test]
    fn test_empty_partition_key_rejected() {
        let event =
            DomainEvent::new(EventType::WORKSPACE_CREATED, Uuid::now_v7(), Value::Null).unwrap();
        assert!(event.with_partition_key("  ").is_err());
    }

    #[test]
    fn test_wire_form_adds_type_and_timestamp() {
        let event = DomainEvent::new(
            EventType::WORKSPACE_UPDATED,
            Uuid::now_v7(),
            json!({"name": "Acme"}),
        )
        .unwrap();

        let body = event.to_json();
        assert_eq!(body["type"], "workspace.updated");
        assert_eq!(body["name"], "Acme");
        assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_wire_form_keeps_existing_type_and_timestamp() {
        let event = DomainEvent::new(
            EventType::WORKSPACE_UPDATED,
            Uuid::now_v7(),
            json!({"type": "custom", "timestamp": "2024-01-01T00:00:00Z"}),
        )
        .unwrap();

        let body = event.to_json();
        assert_eq!(body["type"], "custom");
        assert_eq!(body["timestamp"], "2024-01-01T00:00:00Z");
    }

    proptest! {
        #[test]
        fn prop_valid_event_types_roundtrip(
            segments in prop::collection::vec("[a-z0-9_]{1,8}", 2..5)
        ) {
            let raw = segments.join(".");
            let parsed = EventType::parse(&raw).unwrap();
            prop_assert_eq!(parsed.as_str(), raw.as_str());
            prop_assert_eq!(parsed.namespace(), segments[0].as_str());
        }

        #[test]
        fn prop_uppercase_is_rejected(head in "[a-z]{1,6}", tail in "[A-Z]{1,6}") {
            let raw = format!("{}.{}", head, tail);
            prop_assert!(EventType::parse(&raw).is_err());
        }
    }
}
