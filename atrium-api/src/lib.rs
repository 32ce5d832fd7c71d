//! Atrium API - Mutation side-effect pipeline and admin surface
//!
//! After a workspace mutation commits, [`MutationPipeline`] fans out its
//! side effects: cache invalidation, a domain event on the broker, and
//! signed webhook deliveries. None of these can fail the mutation.
//!
//! The Axum router exposes webhook subscription management, a synchronous
//! test delivery, health checks and Prometheus metrics.

mod macros;

pub mod config;
pub mod error;
#[cfg(feature = "openapi")]
pub mod openapi;
pub mod pipeline;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod types;
pub mod webhooks;

pub use config::{ApiConfig, SubscriptionBackend};
pub use error::{ApiError, ApiResult, ErrorCode};
#[cfg(feature = "openapi")]
pub use openapi::ApiDoc;
pub use pipeline::{MutationCommitted, MutationPipeline, MutationReceipt};
pub use routes::create_api_router;
pub use state::{AppState, Collaborators, Workers};
pub use types::*;
pub use webhooks::{
    sign, verify, DeliveryError, DeliveryHandle, DeliveryReceipt, DispatchQueue,
    WebhookDispatcher, EVENT_HEADER, SIGNATURE_HEADER,
};
