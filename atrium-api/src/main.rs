//! Atrium API Server Entry Point
//!
//! Reads configuration, opens the cache and subscription stores, wires the
//! mutation pipeline and starts the Axum HTTP server.

use std::time::Duration;

use atrium_api::telemetry::{init_tracer, TelemetryConfig};
use atrium_api::{create_api_router, ApiConfig, ApiError, ApiResult, AppState, Collaborators};
use tokio::signal;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::default();
    init_tracer(&telemetry_config)?;

    let config = ApiConfig::from_env()?;
    let collaborators = Collaborators::connect(&config).await?;
    let (state, workers) = AppState::build(&config.pipeline, collaborators)?;

    let app = create_api_router(state, &config);

    let addr = config.bind_addr;
    tracing::info!(%addr, service = %telemetry_config.service_name, "Starting Atrium API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    // Returns once every open connection has finished, which drops the
    // router and with it the last AppState clone.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;

    if tokio::time::timeout(SHUTDOWN_GRACE, workers.drain()).await.is_err() {
        tracing::warn!(
            grace_secs = SHUTDOWN_GRACE.as_secs(),
            "Pipeline did not drain before shutdown, in-flight deliveries abandoned"
        );
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("Shutdown signal received, draining connections");
}
