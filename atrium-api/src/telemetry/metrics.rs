//! Prometheus Metrics Definitions
//!
//! Defines all Atrium metrics and exposes a /metrics endpoint for scraping.

use axum::{http::StatusCode, response::IntoResponse};
use atrium_core::DomainEvent;
use atrium_events::{EventError, PublishObserver};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Webhook delivery latency buckets (seconds), up to the delivery timeout
const DELIVERY_LATENCY_BUCKETS: &[f64] = &[0.010, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0];

/// Global metrics instance - initialized on first use
pub static METRICS: Lazy<ApiResult<AtriumMetrics>> = Lazy::new(AtriumMetrics::new);

/// Run `f` against the global metrics if they registered successfully.
pub(crate) fn with_metrics(f: impl FnOnce(&AtriumMetrics)) {
    if let Ok(metrics) = METRICS.as_ref() {
        f(metrics);
    }
}

/// Container for all Atrium metrics.
#[derive(Clone)]
pub struct AtriumMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Webhook delivery counter - labels: status (success/failure)
    pub webhook_deliveries_total: CounterVec,

    /// Webhook delivery duration histogram - labels: status
    pub webhook_delivery_duration_seconds: HistogramVec,

    /// Broker publication counter - labels: status (success/failure)
    pub events_published_total: CounterVec,

    /// Cache invalidation counter - labels: status (success/failure)
    pub cache_invalidations_total: CounterVec,

    /// Items dropped on a full queue - labels: queue (events/webhooks)
    pub queue_dropped_total: CounterVec,
}

impl AtriumMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "atrium_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| registration_error("http_requests_total", e))?,

            http_request_duration_seconds: register_histogram_vec!(
                "atrium_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_error("http_request_duration_seconds", e))?,

            webhook_deliveries_total: register_counter_vec!(
                "atrium_webhook_deliveries_total",
                "Total webhook deliveries",
                &["status"]
            )
            .map_err(|e| registration_error("webhook_deliveries_total", e))?,

            webhook_delivery_duration_seconds: register_histogram_vec!(
                "atrium_webhook_delivery_duration_seconds",
                "Webhook delivery duration in seconds",
                &["status"],
                DELIVERY_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_error("webhook_delivery_duration_seconds", e))?,

            events_published_total: register_counter_vec!(
                "atrium_events_published_total",
                "Total domain events handed to the broker",
                &["status"]
            )
            .map_err(|e| registration_error("events_published_total", e))?,

            cache_invalidations_total: register_counter_vec!(
                "atrium_cache_invalidations_total",
                "Total cache invalidation groups processed",
                &["status"]
            )
            .map_err(|e| registration_error("cache_invalidations_total", e))?,

            queue_dropped_total: register_counter_vec!(
                "atrium_queue_dropped_total",
                "Total items dropped because a side-effect queue was full",
                &["queue"]
            )
            .map_err(|e| registration_error("queue_dropped_total", e))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    /// Record a finished webhook delivery.
    pub fn record_webhook_delivery(&self, success: bool, duration_secs: f64) {
        let status = success_label(success);
        self.webhook_deliveries_total.with_label_values(&[status]).inc();
        self.webhook_delivery_duration_seconds
            .with_label_values(&[status])
            .observe(duration_secs);
    }

    pub fn record_event_published(&self, success: bool) {
        self.events_published_total
            .with_label_values(&[success_label(success)])
            .inc();
    }

    pub fn record_cache_invalidation(&self, success: bool) {
        self.cache_invalidations_total
            .with_label_values(&[success_label(success)])
            .inc();
    }

    pub fn record_queue_drop(&self, queue: &str) {
        self.queue_dropped_total.with_label_values(&[queue]).inc();
    }
}

fn success_label(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

fn registration_error(name: &str, e: prometheus::Error) -> ApiError {
    ApiError::internal_error(format!("Failed to register {}: {}", name, e))
}

/// Feeds broker publication outcomes into [`METRICS`].
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsPublishObserver;

impl PublishObserver for MetricsPublishObserver {
    fn published(&self, _event: &DomainEvent, outcome: &Result<(), EventError>) {
        with_metrics(|m| m.record_event_published(outcome.is_ok()));
    }

    fn dropped(&self, _event: &DomainEvent) {
        with_metrics(|m| m.record_queue_drop("events"));
    }
}

/// Handler for GET /metrics.
///
/// Returns Prometheus text format metrics.
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/metrics",
    tag = "Observability",
    responses(
        (status = 200, description = "Prometheus metrics in text format", content_type = "text/plain"),
        (status = 500, description = "Failed to encode metrics"),
    ),
))]
pub async fn metrics_handler() -> impl IntoResponse {
    // Register on first scrape even if nothing has been recorded yet.
    Lazy::force(&METRICS);

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::core::Collector;

    fn metrics() -> Result<&'static AtriumMetrics, String> {
        METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e.message))
    }

    #[test]
    fn test_metrics_creation() -> Result<(), String> {
        let metrics = metrics()?;
        assert!(!metrics.webhook_deliveries_total.desc().is_empty());
        Ok(())
    }

    #[test]
    fn test_webhook_delivery_counts() -> Result<(), String> {
        let metrics = metrics()?;
        let before = metrics
            .webhook_deliveries_total
            .with_label_values(&["failure"])
            .get();
        metrics.record_webhook_delivery(false, 0.2);
        let after = metrics
            .webhook_deliveries_total
            .with_label_values(&["failure"])
            .get();
        assert!(after >= before + 1.0);
        Ok(())
    }

    #[test]
    fn test_publish_observer_records_drops() -> Result<(), String> {
        let metrics = metrics()?;
        let event = DomainEvent::new(
            atrium_core::EventType::MEMBER_JOINED,
            uuid::Uuid::now_v7(),
            serde_json::json!({}),
        )
        .map_err(|e| e.to_string())?;

        let before = metrics.queue_dropped_total.with_label_values(&["events"]).get();
        MetricsPublishObserver.dropped(&event);
        let after = metrics.queue_dropped_total.with_label_values(&["events"]).get();
        assert!(after >= before + 1.0);
        Ok(())
    }
}
