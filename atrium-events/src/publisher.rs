//! Event publisher.
//!
//! [`EventPublisher::publish`] writes one event to the broker and reports the
//! result. [`EventPublisher::enqueue`] is the fire-and-forget path used after
//! a mutation commits: the event goes onto a bounded queue drained by a
//! single worker task, so events reach the broker in enqueue order and
//! per-partition order is preserved end to end.
//!
//! Delivery is at most once. A full queue drops the event; a broker failure
//! or a publish that outlives `publish_timeout` is logged and the event is
//! gone.

use std::sync::Arc;
use std::time::Duration;

use atrium_core::{DomainEvent, EventSettings};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::broker::BrokerClient;
use crate::error::EventError;

/// Receives publication outcomes, e.g. to feed metrics.
pub trait PublishObserver: Send + Sync {
    /// Called by the worker after each broker attempt.
    fn published(&self, _event: &DomainEvent, _outcome: &Result<(), EventError>) {}

    /// Called when an event is dropped because the queue was full.
    fn dropped(&self, _event: &DomainEvent) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl PublishObserver for NoopObserver {}

struct Shared {
    broker: Arc<dyn BrokerClient>,
    topic: String,
    publish_timeout: Duration,
    observer: Arc<dyn PublishObserver>,
}

impl Shared {
    async fn publish(&self, topic: &str, partition_key: &str, event: &DomainEvent) -> Result<(), EventError> {
        let payload = event.to_bytes().map_err(|e| EventError::Serialization {
            event_type: event.event_type().to_string(),
            cause: e.to_string(),
        })?;

        tracing::debug!(
            topic,
            partition_key,
            event_type = %event.event_type(),
            payload_size = payload.len(),
            "publishing event"
        );
        match tokio::time::timeout(
            self.publish_timeout,
            self.broker.publish(topic, partition_key, payload),
        )
        .await
        {
            Ok(result) => Ok(result?),
            Err(_) => Err(EventError::Timeout {
                topic: topic.to_string(),
                after_ms: u64::try_from(self.publish_timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}

/// Publishes domain events to the configured broker topic.
///
/// Cloning is cheap; all clones share one queue and one worker.
#[derive(Clone)]
pub struct EventPublisher {
    shared: Arc<Shared>,
    queue: mpsc::Sender<DomainEvent>,
}

impl std::fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPublisher")
            .field("broker", &self.shared.broker.name())
            .field("topic", &self.shared.topic)
            .field("queue_capacity", &self.queue.max_capacity())
            .finish()
    }
}

impl EventPublisher {
    /// Create a publisher and spawn its queue worker.
    ///
    /// The worker exits once every clone of the publisher has been dropped
    /// and the queue is drained. Must be called within a Tokio runtime.
    pub fn spawn(
        broker: Arc<dyn BrokerClient>,
        settings: &EventSettings,
        observer: Arc<dyn PublishObserver>,
    ) -> (Self, JoinHandle<()>) {
        let shared = Arc::new(Shared {
            broker,
            topic: settings.topic.clone(),
            publish_timeout: settings.publish_timeout,
            observer,
        });
        let (tx, rx) = mpsc::channel(settings.queue_capacity.max(1));
        let worker = tokio::spawn(publish_loop(Arc::clone(&shared), rx));

        tracing::info!(
            broker = shared.broker.name(),
            topic = %shared.topic,
            queue_capacity = settings.queue_capacity,
            "event publisher started"
        );

        (Self { shared, queue: tx }, worker)
    }

    /// The configured topic.
    pub fn topic(&self) -> &str {
        &self.shared.topic
    }

    /// Publish one event and wait for the broker to accept it.
    pub async fn publish(
        &self,
        topic: &str,
        partition_key: &str,
        event: &DomainEvent,
    ) -> Result<(), EventError> {
        self.shared.publish(topic, partition_key, event).await
    }

    /// Publish to the configured topic under the event's own partition key.
    pub async fn publish_event(&self, event: &DomainEvent) -> Result<(), EventError> {
        self.shared
            .publish(&self.shared.topic, event.partition_key(), event)
            .await
    }

    /// Queue an event for background publication without waiting.
    ///
    /// Returns whether the event was accepted. A full queue drops the event
    /// with a warning.
    pub fn enqueue(&self, event: DomainEvent) -> bool {
        match self.queue.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                let err = EventError::QueueFull {
                    event_type: event.event_type().to_string(),
                };
                tracing::warn!(
                    event_type = %event.event_type(),
                    partition_key = %event.partition_key(),
                    error = %err,
                    "event dropped"
                );
                self.shared.observer.dropped(&event);
                false
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                tracing::warn!(
                    event_type = %event.event_type(),
                    error = %EventError::QueueClosed,
                    "event dropped"
                );
                self.shared.observer.dropped(&event);
                false
            }
        }
    }
}

async fn publish_loop(shared: Arc<Shared>, mut rx: mpsc::Receiver<DomainEvent>) {
    while let Some(event) = rx.recv().await {
        let outcome = shared
            .publish(&shared.topic, event.partition_key(), &event)
            .await;

        if let Err(e) = &outcome {
            tracing::warn!(
                event_type = %event.event_type(),
                topic = %shared.topic,
                partition_key = %event.partition_key(),
                error = %e,
                "event publication failed"
            );
        }
        shared.observer.published(&event, &outcome);
    }
    tracing::debug!(topic = %shared.topic, "event publisher stopped");
}
