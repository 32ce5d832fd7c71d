//! Webhook Request and Response Types

use atrium_core::{SubscriptionId, Timestamp, WebhookSubscription, WorkspaceId};
use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Minimum accepted length of a subscription secret.
pub const MIN_SECRET_LEN: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct CreateWebhookRequest {
    /// Absolute http(s) URL that receives the POST
    pub url: String,
    /// Event types to receive, e.g. ["member.joined", "workspace.updated"]
    pub event_types: Vec<String>,
    /// Shared HMAC secret, at least 16 characters
    pub secret: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct UpdateWebhookRequest {
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct TestWebhookRequest {
    /// Extra fields merged into the test payload
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub payload: Option<serde_json::Value>,
}

/// A webhook subscription as returned by the API. The secret is never
/// included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct WebhookResponse {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: SubscriptionId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub workspace_id: WorkspaceId,
    pub url: String,
    pub event_types: Vec<String>,
    pub active: bool,
    /// Consecutive failed deliveries since the last success
    pub failure_count: u64,
    pub success_count: u64,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub last_triggered_at: Option<Timestamp>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
}

impl From<&WebhookSubscription> for WebhookResponse {
    fn from(sub: &WebhookSubscription) -> Self {
        Self {
            id: sub.id,
            workspace_id: sub.workspace_id,
            url: sub.url.clone(),
            event_types: sub.event_types.iter().map(|t| t.to_string()).collect(),
            active: sub.active,
            failure_count: sub.failure_count,
            success_count: sub.success_count,
            last_triggered_at: sub.last_triggered_at,
            created_at: sub.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ListWebhooksResponse {
    pub webhooks: Vec<WebhookResponse>,
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use atrium_core::EventType;
    use uuid::Uuid;

    #[test]
    fn test_response_omits_secret() {
        let sub = WebhookSubscription::new(
            Uuid::now_v7(),
            "https://hooks.example.com/a",
            "super-secret-value-123",
            [EventType::MEMBER_JOINED, EventType::MEMBER_REMOVED],
        );
        let json = serde_json::to_string(&WebhookResponse::from(&sub)).unwrap();
        assert!(!json.contains("super-secret-value-123"));
        assert!(json.contains("member.joined"));
    }

    #[test]
    fn test_test_request_payload_is_optional() {
        let req: TestWebhookRequest = serde_json::from_str("{}").unwrap();
        assert!(req.payload.is_none());
    }
}
