//! OpenAPI document for the Atrium admin API.

use axum::Json;
use utoipa::OpenApi;

use crate::error::{ApiError, ErrorCode};
use crate::routes::{health, webhooks};
use crate::types::{
    CreateWebhookRequest, ListWebhooksResponse, TestWebhookRequest, UpdateWebhookRequest,
    WebhookResponse,
};
use crate::webhooks::DeliveryReceipt;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Atrium API",
        description = "Webhook subscription management and pipeline health for Atrium"
    ),
    tags(
        (name = "Webhooks", description = "Webhook subscriptions and test deliveries"),
        (name = "Health", description = "Liveness and readiness"),
        (name = "Observability", description = "Prometheus metrics"),
    ),
    paths(
        webhooks::create_webhook,
        webhooks::list_webhooks,
        webhooks::get_webhook,
        webhooks::update_webhook,
        webhooks::delete_webhook,
        webhooks::test_webhook,
        health::health,
        health::liveness,
        health::readiness,
        crate::telemetry::metrics::metrics_handler,
    ),
    components(schemas(
        ApiError,
        ErrorCode,
        CreateWebhookRequest,
        UpdateWebhookRequest,
        TestWebhookRequest,
        WebhookResponse,
        ListWebhooksResponse,
        DeliveryReceipt,
        health::HealthResponse,
        health::HealthStatus,
        health::HealthDetails,
        health::CacheHealth,
        health::ComponentHealth,
    ))
)]
pub struct ApiDoc;

/// GET /api-docs/openapi.json
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
