//! REST API Routes
//!
//! Assembles the admin router: webhook subscription management, health
//! checks, Prometheus metrics and (with the `openapi` feature) the OpenAPI
//! document.

pub mod health;
pub mod webhooks;

use std::time::Duration;

use axum::{
    error_handling::HandleErrorLayer,
    extract::DefaultBodyLimit,
    http::{header, Method},
    middleware::from_fn,
    response::IntoResponse,
    routing::get,
    BoxError, Router,
};
use tower::timeout::error::Elapsed;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

/// Build the CORS layer. Empty origins allow everything (dev mode).
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(86400));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: Development mode - allowing all origins");
        cors.allow_origin(Any)
    } else {
        tracing::info!(origins = ?config.cors_origins, "CORS: restricted origins");
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}

async fn handle_middleware_error(err: BoxError) -> impl IntoResponse {
    if err.is::<Elapsed>() {
        ApiError::timeout("request")
    } else {
        tracing::error!(error = %err, "Unhandled middleware error");
        ApiError::internal_error("Unhandled middleware error")
    }
}

/// Create the complete API router.
pub fn create_api_router(state: AppState, config: &ApiConfig) -> Router {
    let router = Router::new()
        .merge(webhooks::create_router())
        .merge(health::create_router())
        .route("/metrics", get(metrics_handler));

    #[cfg(feature = "openapi")]
    let router = router.route("/api-docs/openapi.json", get(crate::openapi::openapi_json));

    router
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_middleware_error))
                .timeout(config.request_timeout),
        )
        .layer(from_fn(observability_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(config))
        .with_state(state)
}
