//! Atrium Telemetry - Observability Infrastructure
//!
//! Structured JSON logging through `tracing` and Prometheus metrics for the
//! pipeline and the admin API. Works standalone without external collectors.

pub mod metrics;
pub mod middleware;
pub mod tracer;

pub use metrics::{metrics_handler, AtriumMetrics, MetricsPublishObserver, METRICS};
pub use middleware::observability_middleware;
pub use tracer::{init_tracer, TelemetryConfig};
