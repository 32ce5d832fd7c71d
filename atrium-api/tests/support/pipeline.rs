//! Shared wiring for pipeline integration tests.
#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use atrium_api::{AppState, Collaborators, Workers};
use atrium_core::{PipelineConfig, SubscriptionId, WebhookSettings, WebhookSubscription};
use atrium_events::InMemoryBroker;
use atrium_storage::{CacheStore, InMemoryCacheStore, InMemorySubscriptionStore, SubscriptionStore};

/// A pipeline built on in-memory collaborators the test can inspect.
pub struct Harness {
    pub state: AppState,
    pub workers: Workers,
    pub broker: Arc<InMemoryBroker>,
    pub cache_store: Arc<InMemoryCacheStore>,
    pub subscriptions: Arc<InMemorySubscriptionStore>,
}

pub fn config_with_timeout(delivery_timeout: Duration) -> PipelineConfig {
    PipelineConfig {
        webhooks: WebhookSettings {
            delivery_timeout,
            ..WebhookSettings::default()
        },
        ..PipelineConfig::default()
    }
}

pub fn harness(config: &PipelineConfig) -> Harness {
    let broker = Arc::new(InMemoryBroker::new());
    let cache_store = Arc::new(InMemoryCacheStore::new());
    let subscriptions = Arc::new(InMemorySubscriptionStore::new());
    let collaborators = Collaborators {
        cache_store: cache_store.clone() as Arc<dyn CacheStore>,
        broker: broker.clone(),
        subscriptions: subscriptions.clone() as Arc<dyn SubscriptionStore>,
    };
    let (state, workers) = AppState::build(config, collaborators).expect("pipeline builds");
    Harness {
        state,
        workers,
        broker,
        cache_store,
        subscriptions,
    }
}

pub async fn register(store: &InMemorySubscriptionStore, sub: WebhookSubscription) -> SubscriptionId {
    let id = sub.id;
    store.insert(sub).await.expect("insert subscription");
    id
}

/// Poll `check` until it returns true or `within` elapses.
pub async fn eventually<F, Fut>(within: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

pub async fn counters(store: &InMemorySubscriptionStore, id: SubscriptionId) -> (u64, u64) {
    let sub = store.get(id).await.expect("store read").expect("subscription exists");
    (sub.success_count, sub.failure_count)
}
