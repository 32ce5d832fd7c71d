//! Webhook subscription management endpoints.
//!
//! Registration, listing, lookup, activation toggle, removal, and the
//! synchronous test delivery. Test delivery is the only place a subscriber
//! failure is reported back to a user.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use atrium_core::{DomainEvent, EventType, SubscriptionId, WebhookSubscription, WorkspaceId};
use atrium_storage::SubscriptionStore;
use serde_json::{json, Value};
#[cfg(feature = "openapi")]
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::types::{
    CreateWebhookRequest, ListWebhooksResponse, TestWebhookRequest, UpdateWebhookRequest,
    WebhookResponse, MIN_SECRET_LEN,
};
use crate::webhooks::dispatcher::parse_endpoint;
use crate::webhooks::{DeliveryReceipt, WebhookDispatcher};

type Store = Arc<dyn SubscriptionStore>;

// ============================================================================
// VALIDATION
// ============================================================================

fn validate_create(
    workspace_id: WorkspaceId,
    req: CreateWebhookRequest,
) -> ApiResult<WebhookSubscription> {
    if req.url.trim().is_empty() {
        return Err(ApiError::missing_field("url"));
    }
    let url = parse_endpoint(&req.url)
        .map_err(|_| ApiError::invalid_format("url", "an absolute http or https URL"))?;

    if req.event_types.is_empty() {
        return Err(ApiError::missing_field("event_types"));
    }
    let event_types = req
        .event_types
        .iter()
        .map(|raw| EventType::parse(raw.trim()))
        .collect::<Result<Vec<_>, _>>()?;

    if req.secret.chars().count() < MIN_SECRET_LEN {
        return Err(ApiError::invalid_input(format!(
            "Secret must be at least {} characters",
            MIN_SECRET_LEN
        )));
    }

    Ok(WebhookSubscription::new(
        workspace_id,
        url.as_str(),
        req.secret,
        event_types,
    ))
}

async fn load(store: &Store, id: SubscriptionId) -> ApiResult<WebhookSubscription> {
    store
        .get(id)
        .await?
        .ok_or_else(|| ApiError::webhook_not_found(id))
}

/// Payload sent by the test action: caller fields plus identifying fields.
fn test_payload(subscription: &WebhookSubscription, extra: Option<Value>) -> ApiResult<Value> {
    let mut body = match extra {
        None | Some(Value::Null) => serde_json::Map::new(),
        Some(Value::Object(map)) => map,
        Some(_) => return Err(ApiError::invalid_format("payload", "a JSON object")),
    };
    body.insert("subscription_id".to_string(), json!(subscription.id));
    body.entry("message")
        .or_insert_with(|| json!("Test delivery from Atrium"));
    Ok(Value::Object(body))
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// POST /api/v1/workspaces/{workspace_id}/webhooks - Register a webhook
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/v1/workspaces/{workspace_id}/webhooks",
    tag = "Webhooks",
    params(("workspace_id" = Uuid, Path, description = "Workspace ID")),
    request_body = CreateWebhookRequest,
    responses(
        (status = 201, description = "Webhook registered", body = WebhookResponse),
        (status = 400, description = "Invalid request", body = ApiError),
    ),
))]
pub async fn create_webhook(
    State(store): State<Store>,
    Path(workspace_id): Path<WorkspaceId>,
    Json(req): Json<CreateWebhookRequest>,
) -> ApiResult<impl IntoResponse> {
    let subscription = validate_create(workspace_id, req)?;
    store.insert(subscription.clone()).await?;

    tracing::info!(
        subscription_id = %subscription.id,
        workspace_id = %workspace_id,
        url = %subscription.url,
        "Webhook registered"
    );

    Ok((
        StatusCode::CREATED,
        Json(WebhookResponse::from(&subscription)),
    ))
}

/// GET /api/v1/workspaces/{workspace_id}/webhooks - List a workspace's webhooks
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/v1/workspaces/{workspace_id}/webhooks",
    tag = "Webhooks",
    params(("workspace_id" = Uuid, Path, description = "Workspace ID")),
    responses(
        (status = 200, description = "Webhooks of the workspace", body = ListWebhooksResponse),
    ),
))]
pub async fn list_webhooks(
    State(store): State<Store>,
    Path(workspace_id): Path<WorkspaceId>,
) -> ApiResult<Json<ListWebhooksResponse>> {
    let webhooks: Vec<_> = store
        .list(workspace_id)
        .await?
        .iter()
        .map(WebhookResponse::from)
        .collect();
    Ok(Json(ListWebhooksResponse {
        total: webhooks.len(),
        webhooks,
    }))
}

/// GET /api/v1/webhooks/{id} - Get a webhook
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/v1/webhooks/{id}",
    tag = "Webhooks",
    params(("id" = Uuid, Path, description = "Webhook ID")),
    responses(
        (status = 200, description = "Webhook details", body = WebhookResponse),
        (status = 404, description = "Webhook not found", body = ApiError),
    ),
))]
pub async fn get_webhook(
    State(store): State<Store>,
    Path(id): Path<SubscriptionId>,
) -> ApiResult<Json<WebhookResponse>> {
    let subscription = load(&store, id).await?;
    Ok(Json(WebhookResponse::from(&subscription)))
}

/// PATCH /api/v1/webhooks/{id} - Activate or deactivate a webhook
#[cfg_attr(feature = "openapi", utoipa::path(
    patch,
    path = "/api/v1/webhooks/{id}",
    tag = "Webhooks",
    params(("id" = Uuid, Path, description = "Webhook ID")),
    request_body = UpdateWebhookRequest,
    responses(
        (status = 200, description = "Webhook updated", body = WebhookResponse),
        (status = 404, description = "Webhook not found", body = ApiError),
    ),
))]
pub async fn update_webhook(
    State(store): State<Store>,
    Path(id): Path<SubscriptionId>,
    Json(req): Json<UpdateWebhookRequest>,
) -> ApiResult<Json<WebhookResponse>> {
    if let Some(active) = req.active {
        store.set_active(id, active).await?;
        tracing::info!(subscription_id = %id, active, "Webhook activation changed");
    }
    let subscription = load(&store, id).await?;
    Ok(Json(WebhookResponse::from(&subscription)))
}

/// DELETE /api/v1/webhooks/{id} - Remove a webhook
#[cfg_attr(feature = "openapi", utoipa::path(
    delete,
    path = "/api/v1/webhooks/{id}",
    tag = "Webhooks",
    params(("id" = Uuid, Path, description = "Webhook ID")),
    responses(
        (status = 204, description = "Webhook removed"),
        (status = 404, description = "Webhook not found", body = ApiError),
    ),
))]
pub async fn delete_webhook(
    State(store): State<Store>,
    Path(id): Path<SubscriptionId>,
) -> ApiResult<StatusCode> {
    match store.remove(id).await? {
        Some(_) => {
            tracing::info!(subscription_id = %id, "Webhook removed");
            Ok(StatusCode::NO_CONTENT)
        }
        None => Err(ApiError::webhook_not_found(id)),
    }
}

/// POST /api/v1/webhooks/{id}/test - Deliver a test event and wait for the result
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/v1/webhooks/{id}/test",
    tag = "Webhooks",
    params(("id" = Uuid, Path, description = "Webhook ID")),
    request_body = TestWebhookRequest,
    responses(
        (status = 200, description = "Endpoint accepted the test delivery", body = DeliveryReceipt),
        (status = 404, description = "Webhook not found", body = ApiError),
        (status = 502, description = "Endpoint rejected or did not answer", body = ApiError),
    ),
))]
pub async fn test_webhook(
    State(dispatcher): State<WebhookDispatcher>,
    Path(id): Path<SubscriptionId>,
    body: Option<Json<TestWebhookRequest>>,
) -> ApiResult<Json<DeliveryReceipt>> {
    let subscription = load(dispatcher.store(), id).await?;
    let extra = body.and_then(|Json(req)| req.payload);
    let event = DomainEvent::new(
        EventType::WEBHOOK_TEST,
        subscription.workspace_id,
        test_payload(&subscription, extra)?,
    )?;

    match dispatcher.test(&subscription, &event).await {
        Ok(receipt) => Ok(Json(receipt)),
        Err(err) => {
            let details = serde_json::to_value(&err.failure).unwrap_or(Value::Null);
            Err(ApiError::delivery_failed(err.failure.to_string()).with_details(details))
        }
    }
}

// ============================================================================
// ROUTER SETUP
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/workspaces/:workspace_id/webhooks",
            post(create_webhook).get(list_webhooks),
        )
        .route(
            "/api/v1/webhooks/:id",
            get(get_webhook).patch(update_webhook).delete(delete_webhook),
        )
        .route("/api/v1/webhooks/:id/test", post(test_webhook))
}
