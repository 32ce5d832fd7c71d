//! Cache invalidation, event publication and degradation behaviour of the
//! mutation pipeline.

use std::sync::Arc;
use std::time::Duration;

use atrium_api::{AppState, Collaborators, MutationCommitted};
use atrium_core::{EntityKind, EntityRef, EventType, PipelineConfig, ValidationError};
use atrium_storage::{CacheKey, InMemorySubscriptionStore, SubscriptionStore};
use atrium_test_utils::{fixtures, FailingBroker, FailingCacheStore};
use serde_json::{json, Value};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

#[path = "support/pipeline.rs"]
mod pipeline_support;
use pipeline_support::{counters, eventually, harness, register};

const WAIT: Duration = Duration::from_secs(5);

fn rename(workspace_id: uuid::Uuid, name: &str) -> MutationCommitted {
    MutationCommitted::new(
        EntityRef::workspace(workspace_id),
        EventType::WORKSPACE_UPDATED,
        json!({ "name": name }),
        workspace_id,
    )
}

#[tokio::test]
async fn test_workspace_rename_invalidates_stats_entry() {
    let h = harness(&PipelineConfig::default());
    let cache = h.state.pipeline.cache();
    let ws = fixtures::workspace_id();
    let stats_key = CacheKey::new(EntityKind::WorkspaceStats, ws);

    assert!(cache.put(&stats_key, &json!({ "members": 4 }), None).await);
    assert!(cache.get::<Value>(&stats_key).await.is_some());

    let receipt = h.state.pipeline.on_mutation_committed(rename(ws, "Acme")).await.unwrap();

    // Invalidation is complete when the call returns.
    assert!(receipt.invalidation.is_ok());
    assert!(receipt.invalidation.keys.contains(&stats_key.encode()));
    assert_eq!(receipt.invalidation.deleted, 1);
    assert!(cache.get::<Value>(&stats_key).await.is_none());
}

#[tokio::test]
async fn test_extra_cache_keys_are_cleared_with_the_group() {
    let h = harness(&PipelineConfig::default());
    let cache = h.state.pipeline.cache();
    let ws = fixtures::workspace_id();
    let role_id = uuid::Uuid::now_v7();
    let role_key = CacheKey::new(EntityKind::Role, role_id);
    let members_key = CacheKey::new(EntityKind::WorkspaceMembers, ws);
    cache.put(&role_key, &"owner", None).await;
    cache.put(&members_key, &vec!["a", "b"], None).await;

    let mutation = MutationCommitted::new(
        EntityRef::member(uuid::Uuid::now_v7(), ws),
        EventType::MEMBER_ROLE_CHANGED,
        json!({ "role_id": role_id }),
        ws,
    )
    .with_cache_keys([role_key.clone()]);
    let receipt = h.state.pipeline.on_mutation_committed(mutation).await.unwrap();

    assert_eq!(receipt.invalidation.deleted, 2);
    assert!(cache.get::<String>(&role_key).await.is_none());
    assert!(cache.get::<Vec<String>>(&members_key).await.is_none());
}

#[tokio::test]
async fn test_event_reaches_broker_under_workspace_partition() {
    let h = harness(&PipelineConfig::default());
    let ws = fixtures::workspace_id();
    let topic = h.state.pipeline.publisher().topic().to_string();

    h.state.pipeline.on_mutation_committed(rename(ws, "First")).await.unwrap();
    h.state.pipeline.on_mutation_committed(rename(ws, "Second")).await.unwrap();

    let broker = &h.broker;
    let key = ws.to_string();
    assert!(eventually(WAIT, || {
        let ready = broker.consume(&topic, &key).len() == 2;
        async move { ready }
    })
    .await);

    let names: Vec<String> = broker
        .consume(&topic, &key)
        .iter()
        .map(|r| r.json().unwrap()["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["First", "Second"]);

    let record = broker.consume(&topic, &key)[0].json().unwrap();
    assert_eq!(record["type"], "workspace.updated");
    assert!(record["timestamp"].is_string());
}

#[tokio::test]
async fn test_malformed_payload_is_rejected_before_side_effects() {
    let h = harness(&PipelineConfig::default());
    let ws = fixtures::workspace_id();
    let cache = h.state.pipeline.cache();
    let key = CacheKey::new(EntityKind::Workspace, ws);
    cache.put(&key, &"cached", None).await;

    let mutation = MutationCommitted::new(EntityRef::workspace(ws), EventType::WORKSPACE_UPDATED, json!([1, 2]), ws);
    let err = h.state.pipeline.on_mutation_committed(mutation).await.unwrap_err();

    assert!(matches!(err, ValidationError::PayloadNotObject { .. }));
    assert!(cache.get::<String>(&key).await.is_some());
}

#[tokio::test]
async fn test_unavailable_cache_and_broker_never_fail_the_mutation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let cache_store = Arc::new(FailingCacheStore::new());
    let broker = Arc::new(FailingBroker::new());
    let subscriptions = Arc::new(InMemorySubscriptionStore::new());
    let collaborators = Collaborators {
        cache_store: cache_store.clone(),
        broker: broker.clone(),
        subscriptions: subscriptions.clone() as Arc<dyn SubscriptionStore>,
    };
    let (state, _workers) = AppState::build(&PipelineConfig::default(), collaborators).unwrap();

    let ws = fixtures::workspace_id();
    let sub = register(
        &subscriptions,
        fixtures::subscription(ws, server.uri(), &[EventType::WORKSPACE_UPDATED]),
    )
    .await;

    for n in 0..3 {
        let receipt = state
            .pipeline
            .on_mutation_committed(rename(ws, &format!("name-{}", n)))
            .await
            .unwrap();
        assert!(!receipt.invalidation.is_ok());
        assert!(receipt.event_enqueued);
        assert!(receipt.webhooks_enqueued);
    }

    assert_eq!(cache_store.calls(), 3);
    assert!(state.pipeline.cache().stats().errors >= 3);

    let broker_ref = &broker;
    assert!(eventually(WAIT, || {
        let attempts = broker_ref.attempts();
        async move { attempts == 3 }
    })
    .await);

    // Webhooks are unaffected by the cache and broker outage.
    let store = &subscriptions;
    assert!(eventually(WAIT, || async move { counters(store, sub).await == (3, 0) }).await);
}

#[tokio::test]
async fn test_drain_lets_in_flight_delivery_record_its_outcome() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline_support::Harness {
        state,
        workers,
        subscriptions,
        ..
    } = harness(&PipelineConfig::default());
    let ws = fixtures::workspace_id();
    let sub = register(
        &subscriptions,
        fixtures::subscription(ws, server.uri(), &[EventType::WORKSPACE_UPDATED]),
    )
    .await;

    let receipt = state.pipeline.on_mutation_committed(rename(ws, "Closing")).await.unwrap();
    assert!(receipt.webhooks_enqueued);

    // Shutdown: the router, and with it every AppState clone, is gone.
    drop(state);
    tokio::time::timeout(WAIT, workers.drain())
        .await
        .expect("pipeline drains within the grace period");

    assert_eq!(counters(&subscriptions, sub).await, (1, 0));
}

#[tokio::test]
async fn test_expired_entries_are_swept_without_being_read() {
    let mut config = PipelineConfig::default();
    config.cache.purge_interval = Duration::from_millis(20);
    let h = harness(&config);
    let cache = h.state.pipeline.cache();

    for i in 0..200 {
        let key = CacheKey::new(EntityKind::WorkspaceStats, i);
        assert!(cache.put(&key, &json!({ "members": i }), Some(Duration::from_millis(1))).await);
    }

    let store = &h.cache_store;
    assert!(eventually(WAIT, || async move { store.raw_len() == 0 }).await);
}
