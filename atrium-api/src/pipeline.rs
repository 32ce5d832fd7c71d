//! Mutation side-effect pipeline.
//!
//! Called once per committed mutation. Cache invalidation runs inline and is
//! finished when [`MutationPipeline::on_mutation_committed`] returns; event
//! publication and webhook dispatch are handed to bounded background queues.
//! No infrastructure fault in any of the three steps reaches the caller.

use atrium_core::{DomainEvent, EntityRef, EventType, ValidationError, WorkspaceId};
use atrium_events::EventPublisher;
use atrium_storage::{CacheConsistencyManager, CacheKey, InvalidationReport};
use serde_json::Value;

use crate::telemetry::metrics::with_metrics;
use crate::webhooks::DispatchQueue;

/// Notification that a mutation has been durably committed.
#[derive(Debug, Clone)]
pub struct MutationCommitted {
    /// The mutated entity; its invalidation group is always cleared.
    pub entity: EntityRef,
    /// Extra keys to clear on top of the entity's group.
    pub cache_group_keys: Vec<CacheKey>,
    pub event_type: EventType,
    /// Event-specific fields. Must be a JSON object (or null).
    pub payload: Value,
    pub workspace_id: WorkspaceId,
}

impl MutationCommitted {
    /// Mutation of `entity` in `workspace_id`, with no extra cache keys.
    pub fn new(entity: EntityRef, event_type: EventType, payload: Value, workspace_id: WorkspaceId) -> Self {
        Self {
            entity,
            cache_group_keys: Vec::new(),
            event_type,
            payload,
            workspace_id,
        }
    }

    pub fn with_cache_keys(mut self, keys: impl IntoIterator<Item = CacheKey>) -> Self {
        self.cache_group_keys.extend(keys);
        self
    }
}

/// What the pipeline did with one mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationReceipt {
    pub invalidation: InvalidationReport,
    /// Whether the publish queue accepted the event.
    pub event_enqueued: bool,
    /// Whether the webhook dispatch queue accepted the event.
    pub webhooks_enqueued: bool,
}

/// Coordinates the three side effects of a committed mutation.
#[derive(Debug, Clone)]
pub struct MutationPipeline {
    cache: CacheConsistencyManager,
    publisher: EventPublisher,
    dispatch: DispatchQueue,
}

impl MutationPipeline {
    pub fn new(cache: CacheConsistencyManager, publisher: EventPublisher, dispatch: DispatchQueue) -> Self {
        Self {
            cache,
            publisher,
            dispatch,
        }
    }

    pub fn cache(&self) -> &CacheConsistencyManager {
        &self.cache
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    /// Run the side effects of a committed mutation.
    ///
    /// The event is built first, so a malformed payload is rejected before
    /// anything else happens. Once it is valid this never fails: cache,
    /// broker and webhook problems are logged and counted, and the receipt
    /// records what was accepted.
    pub async fn on_mutation_committed(
        &self,
        mutation: MutationCommitted,
    ) -> Result<MutationReceipt, ValidationError> {
        let MutationCommitted {
            entity,
            cache_group_keys,
            event_type,
            payload,
            workspace_id,
        } = mutation;

        let event = DomainEvent::new(event_type, workspace_id, payload)?;

        let invalidation = self.cache.invalidate(&entity, cache_group_keys).await;
        with_metrics(|m| m.record_cache_invalidation(invalidation.is_ok()));

        let event_enqueued = self.publisher.enqueue(event.clone());
        let webhooks_enqueued = self.dispatch.submit(event);

        tracing::debug!(
            entity = ?entity,
            workspace_id = %workspace_id,
            invalidated = invalidation.deleted,
            event_enqueued,
            webhooks_enqueued,
            "mutation side effects scheduled"
        );

        Ok(MutationReceipt {
            invalidation,
            event_enqueued,
            webhooks_enqueued,
        })
    }
}
