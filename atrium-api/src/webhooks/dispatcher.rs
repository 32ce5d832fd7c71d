//! Webhook dispatcher.
//!
//! [`WebhookDispatcher::dispatch`] fans an event out to every matching
//! subscription, one Tokio task per subscription, and returns without
//! waiting. Those tasks are tracked so [`WebhookDispatcher::drain`] can wait
//! for them at shutdown. [`WebhookDispatcher::test`] runs a single delivery inline and
//! hands the outcome back to the caller.
//!
//! Every delivery is one HTTP POST with a bounded timeout and no retry. The
//! outcome is written to the subscription store through its atomic counter
//! operations and to the `atrium_webhook_deliveries_total` metric.

use std::sync::Arc;

use atrium_core::{
    DeliveryFailure, DomainEvent, EventType, StorageError, WebhookSettings, WebhookSubscription,
};
use atrium_storage::SubscriptionStore;
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

use super::delivery::{classify, outcome_state, DeliveryAttempt, DeliveryError, DeliveryReceipt};
use super::signer::{sign, SIGNATURE_HEADER};
use crate::error::{ApiError, ApiResult};
use crate::telemetry::metrics::with_metrics;

/// Header carrying the event type.
pub const EVENT_HEADER: &str = "X-Webhook-Event";

/// Handle to one detached delivery task.
pub type DeliveryHandle = JoinHandle<Result<DeliveryReceipt, DeliveryError>>;

struct Inner {
    client: reqwest::Client,
    store: Arc<dyn SubscriptionStore>,
    settings: WebhookSettings,
    deliveries: TaskTracker,
}

/// Delivers domain events to webhook subscribers.
///
/// Cloning is cheap; clones share one HTTP client and one store.
#[derive(Clone)]
pub struct WebhookDispatcher {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for WebhookDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookDispatcher")
            .field("store", &self.inner.store.backend_name())
            .field("delivery_timeout", &self.inner.settings.delivery_timeout)
            .field("in_flight", &self.inner.deliveries.len())
            .finish()
    }
}

impl WebhookDispatcher {
    /// Build a dispatcher with its own HTTP client.
    ///
    /// The client applies `settings.delivery_timeout` to every request and
    /// never follows redirects.
    pub fn new(store: Arc<dyn SubscriptionStore>, settings: &WebhookSettings) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.delivery_timeout)
            .redirect(Policy::none())
            .user_agent(settings.user_agent.as_str())
            .build()
            .map_err(|e| ApiError::internal_error(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                store,
                settings: settings.clone(),
                deliveries: TaskTracker::new(),
            }),
        })
    }

    pub fn store(&self) -> &Arc<dyn SubscriptionStore> {
        &self.inner.store
    }

    pub fn settings(&self) -> &WebhookSettings {
        &self.inner.settings
    }

    /// Number of dispatched deliveries still running.
    pub fn in_flight(&self) -> usize {
        self.inner.deliveries.len()
    }

    /// Wait for every dispatched delivery to finish and record its outcome.
    ///
    /// Call once the dispatch queue has stopped; deliveries dispatched after
    /// the drain starts are still waited for.
    pub async fn drain(&self) {
        let deliveries = &self.inner.deliveries;
        deliveries.close();
        if !deliveries.is_empty() {
            tracing::info!(in_flight = deliveries.len(), "Waiting for in-flight webhook deliveries");
        }
        deliveries.wait().await;
    }

    /// Deliver `event` to every active subscription in `subscriptions` that
    /// matches it, each in its own task.
    ///
    /// Returns immediately. The handles may be dropped; the tasks keep
    /// running to completion and [`drain`](Self::drain) waits for them.
    pub fn dispatch(
        &self,
        event: &DomainEvent,
        subscriptions: Vec<WebhookSubscription>,
    ) -> Vec<DeliveryHandle> {
        let targets: Vec<_> = subscriptions
            .into_iter()
            .filter(|s| s.matches(event))
            .collect();
        if targets.is_empty() {
            return Vec::new();
        }

        let body: Arc<[u8]> = match event.to_bytes() {
            Ok(bytes) => bytes.into(),
            Err(e) => {
                tracing::error!(
                    event_type = %event.event_type(),
                    error = %e,
                    "Failed to serialize webhook payload"
                );
                return Vec::new();
            }
        };

        tracing::debug!(
            event_type = %event.event_type(),
            workspace_id = %event.workspace_id(),
            subscribers = targets.len(),
            "Dispatching webhooks"
        );

        targets
            .into_iter()
            .map(|subscription| {
                let dispatcher = self.clone();
                let event_type = event.event_type().clone();
                let body = Arc::clone(&body);
                self.inner
                    .deliveries
                    .spawn(async move { dispatcher.deliver(&subscription, event_type, &body).await })
            })
            .collect()
    }

    /// Resolve the subscriptions matching `event` from the store, then
    /// [`dispatch`](Self::dispatch) to them.
    pub async fn dispatch_event(&self, event: &DomainEvent) -> Result<Vec<DeliveryHandle>, StorageError> {
        let subscriptions = self
            .inner
            .store
            .matching(event.workspace_id(), event.event_type())
            .await?;
        Ok(self.dispatch(event, subscriptions))
    }

    /// Deliver `event` to one subscription and wait for the outcome.
    ///
    /// Counters and metrics are updated exactly as for a dispatched
    /// delivery. The subscription's event filter and active flag are not
    /// consulted.
    pub async fn test(
        &self,
        subscription: &WebhookSubscription,
        event: &DomainEvent,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let body = match event.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                return Err(DeliveryError {
                    subscription_id: subscription.id,
                    event_type: event.event_type().clone(),
                    failure: DeliveryFailure::Payload {
                        message: e.to_string(),
                    },
                    elapsed_ms: 0,
                })
            }
        };
        self.deliver(subscription, event.event_type().clone(), &body)
            .await
    }

    async fn deliver(
        &self,
        subscription: &WebhookSubscription,
        event_type: EventType,
        body: &[u8],
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let outcome = self.send(subscription, event_type, body).await;
        self.record(subscription, &outcome).await;
        outcome
    }

    async fn send(
        &self,
        subscription: &WebhookSubscription,
        event_type: EventType,
        body: &[u8],
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let signature = match sign(&subscription.secret, body) {
            Ok(signature) => signature,
            Err(e) => {
                return DeliveryAttempt::start(subscription.id, event_type, String::new()).failed(
                    DeliveryFailure::Payload {
                        message: e.to_string(),
                    },
                )
            }
        };
        let attempt = DeliveryAttempt::start(subscription.id, event_type, signature.clone());

        let url = match parse_endpoint(&subscription.url) {
            Ok(url) => url,
            Err(failure) => return attempt.failed(failure),
        };

        tracing::debug!(
            subscription_id = %subscription.id,
            event_type = %attempt.event_type(),
            "Sending webhook"
        );

        let result = self
            .inner
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signature)
            .header(EVENT_HEADER, attempt.event_type().as_str())
            .body(body.to_vec())
            .send()
            .await;

        match result {
            Ok(response) => attempt.responded(response.status().as_u16()),
            Err(e) => attempt.failed(classify(&e)),
        }
    }

    async fn record(
        &self,
        subscription: &WebhookSubscription,
        outcome: &Result<DeliveryReceipt, DeliveryError>,
    ) {
        let store = &self.inner.store;
        let state = outcome_state(outcome);
        match outcome {
            Ok(receipt) => {
                with_metrics(|m| m.record_webhook_delivery(state.is_success(), secs(receipt.elapsed_ms)));
                tracing::info!(
                    subscription_id = %subscription.id,
                    event_type = %receipt.event_type,
                    state = state.label(),
                    status = receipt.status,
                    elapsed_ms = receipt.elapsed_ms,
                    "Webhook delivered"
                );
                if let Err(e) = store.record_success(subscription.id, receipt.delivered_at).await {
                    tracing::warn!(subscription_id = %subscription.id, error = %e, "Failed to record webhook success");
                }
            }
            Err(err) => {
                with_metrics(|m| m.record_webhook_delivery(state.is_success(), secs(err.elapsed_ms)));
                match store.record_failure(subscription.id).await {
                    Ok(failure_count) => tracing::warn!(
                        subscription_id = %subscription.id,
                        event_type = %err.event_type,
                        state = state.label(),
                        error = %err.failure,
                        failure_count,
                        elapsed_ms = err.elapsed_ms,
                        "Webhook delivery failed"
                    ),
                    Err(e) => tracing::warn!(
                        subscription_id = %subscription.id,
                        event_type = %err.event_type,
                        error = %err.failure,
                        store_error = %e,
                        "Webhook delivery failed and the failure could not be recorded"
                    ),
                }
            }
        }
    }
}

/// Subscription endpoints must be absolute http(s) URLs.
pub(crate) fn parse_endpoint(raw: &str) -> Result<reqwest::Url, DeliveryFailure> {
    let url = reqwest::Url::parse(raw.trim()).map_err(|e| DeliveryFailure::InvalidUrl {
        message: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(DeliveryFailure::InvalidUrl {
            message: format!("unsupported scheme `{}`", other),
        }),
    }
}

fn secs(millis: u64) -> f64 {
    millis as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use atrium_storage::InMemorySubscriptionStore;
    use serde_json::json;
    use std::time::Duration;
    use uuid::Uuid;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SECRET: &str = "whsec_0123456789abcdef";

    fn dispatcher(store: Arc<InMemorySubscriptionStore>, timeout: Duration) -> WebhookDispatcher {
        let settings = WebhookSettings {
            delivery_timeout: timeout,
            ..WebhookSettings::default()
        };
        WebhookDispatcher::new(store, &settings).unwrap()
    }

    #[test]
    fn test_parse_endpoint() {
        assert!(parse_endpoint("https://hooks.example.com/x").is_ok());
        assert!(parse_endpoint("http://127.0.0.1:8080").is_ok());
        assert!(matches!(
            parse_endpoint("ftp://example.com"),
            Err(DeliveryFailure::InvalidUrl { .. })
        ));
        assert!(matches!(
            parse_endpoint("not a url"),
            Err(DeliveryFailure::InvalidUrl { .. })
        ));
    }

    #[tokio::test]
    async fn test_delivery_sends_signed_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("content-type", "application/json"))
            .and(header("x-webhook-event", "member.joined"))
            .and(header_exists("x-webhook-signature"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(InMemorySubscriptionStore::new());
        let ws = Uuid::now_v7();
        let sub = WebhookSubscription::new(
            ws,
            format!("{}/hook", server.uri()),
            SECRET,
            [EventType::MEMBER_JOINED],
        );
        store.insert(sub.clone()).await.unwrap();

        let event = DomainEvent::new(EventType::MEMBER_JOINED, ws, json!({ "member_id": "m1" })).unwrap();
        let receipt = dispatcher(store.clone(), Duration::from_secs(5))
            .test(&sub, &event)
            .await
            .unwrap();
        assert_eq!(receipt.status, 204);

        let requests = server.received_requests().await.unwrap();
        let request = &requests[0];
        let sent_sig = request.headers.get("x-webhook-signature").unwrap().to_str().unwrap();
        assert_eq!(sent_sig, receipt.signature);
        assert!(super::super::signer::verify(SECRET, &request.body, sent_sig));
        assert_eq!(request.body, event.to_bytes().unwrap());
    }

    #[tokio::test]
    async fn test_invalid_url_fails_without_request() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let sub = WebhookSubscription::new(Uuid::now_v7(), "mailto:ops@example.com", SECRET, [EventType::ROLE_UPDATED]);
        store.insert(sub.clone()).await.unwrap();

        let event = DomainEvent::new(EventType::ROLE_UPDATED, sub.workspace_id, json!({})).unwrap();
        let err = dispatcher(store.clone(), Duration::from_secs(1))
            .test(&sub, &event)
            .await
            .unwrap_err();
        assert!(matches!(err.failure, DeliveryFailure::InvalidUrl { .. }));
        assert_eq!(store.get(sub.id).await.unwrap().unwrap().failure_count, 1);
    }

    #[tokio::test]
    async fn test_redirect_is_not_followed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/moved"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", "/elsewhere"))
            .mount(&server)
            .await;
        Mock::given(path("/elsewhere"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let store = Arc::new(InMemorySubscriptionStore::new());
        let sub = WebhookSubscription::new(
            Uuid::now_v7(),
            format!("{}/moved", server.uri()),
            SECRET,
            [EventType::BILLING_UPDATED],
        );
        store.insert(sub.clone()).await.unwrap();

        let event = DomainEvent::new(EventType::BILLING_UPDATED, sub.workspace_id, json!({})).unwrap();
        let receipt = dispatcher(store, Duration::from_secs(5))
            .test(&sub, &event)
            .await
            .unwrap();
        assert_eq!(receipt.status, 301);
    }

    #[tokio::test]
    async fn test_drain_waits_for_dropped_deliveries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
            .expect(2)
            .mount(&server)
            .await;

        let store = Arc::new(InMemorySubscriptionStore::new());
        let ws = Uuid::now_v7();
        let subs: Vec<_> = (0..2)
            .map(|i| WebhookSubscription::new(ws, format!("{}/{}", server.uri(), i), SECRET, [EventType::MEMBER_REMOVED]))
            .collect();
        for sub in &subs {
            store.insert(sub.clone()).await.unwrap();
        }

        let dispatcher = dispatcher(store.clone(), Duration::from_secs(5));
        let event = DomainEvent::new(EventType::MEMBER_REMOVED, ws, json!({})).unwrap();
        drop(dispatcher.dispatch(&event, subs.clone()));
        assert_eq!(dispatcher.in_flight(), 2);

        dispatcher.drain().await;

        assert_eq!(dispatcher.in_flight(), 0);
        for sub in &subs {
            assert_eq!(store.get(sub.id).await.unwrap().unwrap().success_count, 1);
        }
    }

    #[tokio::test]
    async fn test_dispatch_skips_non_matching() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let ws = Uuid::now_v7();
        let other = WebhookSubscription::new(ws, "http://127.0.0.1:9/x", SECRET, [EventType::MEMBER_JOINED]);
        let inactive =
            WebhookSubscription::new(ws, "http://127.0.0.1:9/y", SECRET, [EventType::WORKSPACE_UPDATED]).deactivated();

        let event = DomainEvent::new(EventType::WORKSPACE_UPDATED, ws, json!({})).unwrap();
        let handles = dispatcher(store, Duration::from_secs(1)).dispatch(&event, vec![other, inactive]);
        assert!(handles.is_empty());
    }
}
