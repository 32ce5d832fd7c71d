//! Atrium Events - Domain Event Publication
//!
//! Serializes [`DomainEvent`](atrium_core::DomainEvent)s and appends them to a
//! partitioned broker topic. The pipeline uses the queued, fire-and-forget
//! path; tests and synchronous callers can await a single publish.

pub mod broker;
pub mod error;
pub mod publisher;

pub use broker::{BrokerClient, BrokerRecord, InMemoryBroker};
pub use error::EventError;
pub use publisher::{EventPublisher, NoopObserver, PublishObserver};
