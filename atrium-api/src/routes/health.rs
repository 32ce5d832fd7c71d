//! Health Check Endpoints
//!
//! - /health - Summary with pipeline component details
//! - /health/live - Process alive check
//! - /health/ready - Subscription store reachability
//!
//! Cache and broker problems never make the service unready: the pipeline
//! degrades around them.

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use atrium_storage::{CacheStats, SubscriptionStore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::MutationPipeline;
use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct HealthResponse {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct HealthDetails {
    pub version: String,
    pub uptime_seconds: u64,
    pub cache: CacheHealth,
    pub subscription_store: ComponentHealth,
    pub events_topic: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CacheHealth {
    pub backend: String,
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub invalidated: u64,
    pub hit_rate: f64,
}

impl CacheHealth {
    fn new(backend: &str, stats: CacheStats) -> Self {
        Self {
            backend: backend.to_string(),
            hits: stats.hits,
            misses: stats.misses,
            errors: stats.errors,
            invalidated: stats.invalidated,
            hit_rate: stats.hit_rate(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ComponentHealth {
    pub backend: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

async fn check_store(store: &Arc<dyn SubscriptionStore>) -> ComponentHealth {
    let start = Instant::now();
    // Listing an unknown workspace touches the backend without returning data.
    match store.list(Uuid::nil()).await {
        Ok(_) => ComponentHealth {
            backend: store.backend_name().to_string(),
            status: HealthStatus::Healthy,
            latency_ms: Some(start.elapsed().as_millis() as u64),
            error: None,
        },
        Err(e) => ComponentHealth {
            backend: store.backend_name().to_string(),
            status: HealthStatus::Unhealthy,
            latency_ms: None,
            error: Some(e.to_string()),
        },
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /health - Component summary
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy or degraded", body = HealthResponse),
        (status = 503, description = "Subscription store unreachable", body = HealthResponse),
    ),
))]
pub async fn health(
    State(pipeline): State<MutationPipeline>,
    State(store): State<Arc<dyn SubscriptionStore>>,
    State(start_time): State<Instant>,
) -> impl IntoResponse {
    let cache_stats = pipeline.cache().stats();
    let cache = CacheHealth::new(pipeline.cache().backend_name(), cache_stats);
    let subscription_store = check_store(&store).await;

    let status = if subscription_store.status != HealthStatus::Healthy {
        HealthStatus::Unhealthy
    } else if cache.errors > 0 {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    let response = HealthResponse {
        status,
        message: None,
        details: Some(HealthDetails {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: start_time.elapsed().as_secs(),
            cache,
            subscription_store,
            events_topic: pipeline.publisher().topic().to_string(),
        }),
    };
    (status_code(status), Json(response))
}

/// GET /health/live - Process liveness check
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses(
        (status = 200, description = "Process is alive", body = HealthResponse),
    ),
))]
pub async fn liveness() -> impl IntoResponse {
    let response = HealthResponse {
        status: HealthStatus::Healthy,
        message: Some("Process is alive".to_string()),
        details: None,
    };
    (StatusCode::OK, Json(response))
}

/// GET /health/ready - Readiness check
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service is ready", body = HealthResponse),
        (status = 503, description = "Service is not ready", body = HealthResponse),
    ),
))]
pub async fn readiness(State(store): State<Arc<dyn SubscriptionStore>>) -> impl IntoResponse {
    let component = check_store(&store).await;
    let response = HealthResponse {
        status: component.status,
        message: component.error,
        details: None,
    };
    (status_code(response.status), Json(response))
}

fn status_code(status: HealthStatus) -> StatusCode {
    match status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    }
}

// ============================================================================
// ROUTER
// ============================================================================

/// Health routes (no authentication).
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/live", get(liveness))
        .route("/health/ready", get(readiness))
}
