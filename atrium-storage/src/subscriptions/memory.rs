//! In-memory subscription store.

use std::collections::HashMap;

use async_trait::async_trait;
use atrium_core::{EventType, StorageError, SubscriptionId, Timestamp, WebhookSubscription, WorkspaceId};
use tokio::sync::RwLock;

use super::SubscriptionStore;

/// `RwLock<HashMap>`-backed store. Every counter update runs under a single
/// write lock, which makes it atomic with respect to other updates.
#[derive(Debug, Default)]
pub struct InMemorySubscriptionStore {
    subscriptions: RwLock<HashMap<SubscriptionId, WebhookSubscription>>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.subscriptions.read().await.is_empty()
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn insert(&self, subscription: WebhookSubscription) -> Result<(), StorageError> {
        let mut subscriptions = self.subscriptions.write().await;
        if subscriptions.contains_key(&subscription.id) {
            return Err(StorageError::AlreadyExists {
                id: subscription.id,
            });
        }
        subscriptions.insert(subscription.id, subscription);
        Ok(())
    }

    async fn get(&self, id: SubscriptionId) -> Result<Option<WebhookSubscription>, StorageError> {
        Ok(self.subscriptions.read().await.get(&id).cloned())
    }

    async fn remove(&self, id: SubscriptionId) -> Result<Option<WebhookSubscription>, StorageError> {
        Ok(self.subscriptions.write().await.remove(&id))
    }

    async fn list(&self, workspace_id: WorkspaceId) -> Result<Vec<WebhookSubscription>, StorageError> {
        let subscriptions = self.subscriptions.read().await;
        let mut found: Vec<_> = subscriptions
            .values()
            .filter(|s| s.workspace_id == workspace_id)
            .cloned()
            .collect();
        found.sort_by_key(|s| (s.created_at, s.id));
        Ok(found)
    }

    async fn matching(
        &self,
        workspace_id: WorkspaceId,
        event_type: &EventType,
    ) -> Result<Vec<WebhookSubscription>, StorageError> {
        let subscriptions = self.subscriptions.read().await;
        Ok(subscriptions
            .values()
            .filter(|s| s.active && s.workspace_id == workspace_id && s.subscribes_to(event_type))
            .cloned()
            .collect())
    }

    async fn record_success(&self, id: SubscriptionId, at: Timestamp) -> Result<(), StorageError> {
        let mut subscriptions = self.subscriptions.write().await;
        let subscription = subscriptions
            .get_mut(&id)
            .ok_or(StorageError::SubscriptionNotFound { id })?;
        subscription.failure_count = 0;
        subscription.success_count += 1;
        subscription.last_triggered_at = Some(at);
        Ok(())
    }

    async fn record_failure(&self, id: SubscriptionId) -> Result<u64, StorageError> {
        let mut subscriptions = self.subscriptions.write().await;
        let subscription = subscriptions
            .get_mut(&id)
            .ok_or(StorageError::SubscriptionNotFound { id })?;
        subscription.failure_count += 1;
        Ok(subscription.failure_count)
    }

    async fn set_active(&self, id: SubscriptionId, active: bool) -> Result<(), StorageError> {
        let mut subscriptions = self.subscriptions.write().await;
        let subscription = subscriptions
            .get_mut(&id)
            .ok_or(StorageError::SubscriptionNotFound { id })?;
        subscription.active = active;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;
    use uuid::Uuid;

    fn subscription(workspace_id: WorkspaceId, events: &[EventType]) -> WebhookSubscription {
        WebhookSubscription::new(
            workspace_id,
            "https://hooks.example.com/atrium",
            "0123456789abcdef",
            events.iter().cloned(),
        )
    }

    #[tokio::test]
    async fn test_insert_get_remove() {
        let store = InMemorySubscriptionStore::new();
        let sub = subscription(Uuid::now_v7(), &[EventType::MEMBER_JOINED]);
        let id = sub.id;

        store.insert(sub.clone()).await.unwrap();
        assert_eq!(
            store.insert(sub).await,
            Err(StorageError::AlreadyExists { id })
        );
        assert!(store.get(id).await.unwrap().is_some());
        assert!(store.remove(id).await.unwrap().is_some());
        assert!(store.get(id).await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_matching_filters_workspace_event_and_active() {
        let store = InMemorySubscriptionStore::new();
        let ws = Uuid::now_v7();

        let joined = subscription(ws, &[EventType::MEMBER_JOINED]);
        let updated = subscription(ws, &[EventType::WORKSPACE_UPDATED]);
        let inactive = subscription(ws, &[EventType::MEMBER_JOINED]).deactivated();
        let other_ws = subscription(Uuid::now_v7(), &[EventType::MEMBER_JOINED]);
        for sub in [joined.clone(), updated, inactive, other_ws] {
            store.insert(sub).await.unwrap();
        }

        let found = store.matching(ws, &EventType::MEMBER_JOINED).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, joined.id);
        assert_eq!(store.list(ws).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_failure_counter_resets_on_success() {
        let store = InMemorySubscriptionStore::new();
        let sub = subscription(Uuid::now_v7(), &[EventType::WORKSPACE_UPDATED]);
        let id = sub.id;
        store.insert(sub).await.unwrap();

        assert_eq!(store.record_failure(id).await.unwrap(), 1);
        assert_eq!(store.record_failure(id).await.unwrap(), 2);

        let now = Utc::now();
        store.record_success(id, now).await.unwrap();
        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.failure_count, 0);
        assert_eq!(stored.success_count, 1);
        assert_eq!(stored.last_triggered_at, Some(now));
    }

    #[tokio::test]
    async fn test_counters_on_missing_subscription() {
        let store = InMemorySubscriptionStore::new();
        let id = Uuid::now_v7();
        assert_eq!(
            store.record_failure(id).await,
            Err(StorageError::SubscriptionNotFound { id })
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_failures_are_not_lost() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let sub = subscription(Uuid::now_v7(), &[EventType::ROLE_UPDATED]);
        let id = sub.id;
        store.insert(sub).await.unwrap();

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.record_failure(id).await.unwrap() })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.get(id).await.unwrap().unwrap().failure_count, 50);
    }
}
