//! Bounded hand-off from the mutation path to the dispatcher.
//!
//! Resolving subscriptions touches the subscription store, so it is kept off
//! the request task: events are queued with `try_send` and a background loop
//! resolves and dispatches them one at a time. Deliveries themselves still
//! run concurrently, one task per subscription.

use atrium_core::DomainEvent;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::dispatcher::WebhookDispatcher;
use crate::telemetry::metrics::with_metrics;

/// Sending half of the dispatch queue.
#[derive(Debug, Clone)]
pub struct DispatchQueue {
    tx: mpsc::Sender<DomainEvent>,
}

impl DispatchQueue {
    /// Create the queue and spawn its drain loop.
    ///
    /// The loop exits once every clone of the queue has been dropped and the
    /// remaining events have been resolved.
    pub fn spawn(dispatcher: WebhookDispatcher, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(dispatch_loop(dispatcher, rx));
        tracing::info!(queue_capacity = capacity, "webhook dispatch queue started");
        (Self { tx }, worker)
    }

    /// Queue an event for webhook dispatch without waiting.
    ///
    /// Returns whether the event was accepted.
    pub fn submit(&self, event: DomainEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(
                    event_type = %event.event_type(),
                    workspace_id = %event.workspace_id(),
                    "webhook dispatch queue full, event dropped"
                );
                with_metrics(|m| m.record_queue_drop("webhooks"));
                false
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                tracing::warn!(
                    event_type = %event.event_type(),
                    "webhook dispatch queue closed, event dropped"
                );
                with_metrics(|m| m.record_queue_drop("webhooks"));
                false
            }
        }
    }
}

async fn dispatch_loop(dispatcher: WebhookDispatcher, mut rx: mpsc::Receiver<DomainEvent>) {
    while let Some(event) = rx.recv().await {
        if let Err(e) = dispatcher.dispatch_event(&event).await {
            tracing::warn!(
                event_type = %event.event_type(),
                workspace_id = %event.workspace_id(),
                error = %e,
                "failed to resolve webhook subscriptions"
            );
        }
    }
    tracing::debug!("webhook dispatch queue stopped");
}
