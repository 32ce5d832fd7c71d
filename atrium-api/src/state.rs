//! Shared application state and component wiring.

use std::sync::Arc;
use std::time::Instant;

use atrium_core::PipelineConfig;
use atrium_events::{BrokerClient, EventPublisher, InMemoryBroker};
use atrium_storage::{
    open_store, CacheConfig, CacheConsistencyManager, CacheStore, InMemorySubscriptionStore,
    PgSubscriptionStore, SubscriptionStore,
};
use tokio::task::JoinHandle;

use crate::config::{ApiConfig, SubscriptionBackend};
use crate::error::{ApiError, ApiResult};
use crate::pipeline::MutationPipeline;
use crate::telemetry::MetricsPublishObserver;
use crate::webhooks::{DispatchQueue, WebhookDispatcher};

/// External collaborators the pipeline is built on.
#[derive(Clone)]
pub struct Collaborators {
    pub cache_store: Arc<dyn CacheStore>,
    pub broker: Arc<dyn BrokerClient>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
}

impl Collaborators {
    /// In-process collaborators: memory cache, memory broker, memory
    /// subscription store.
    pub fn in_memory() -> Self {
        Self {
            cache_store: Arc::new(atrium_storage::InMemoryCacheStore::new()),
            broker: Arc::new(InMemoryBroker::new()),
            subscriptions: Arc::new(InMemorySubscriptionStore::new()),
        }
    }

    /// Open the collaborators selected by `config`.
    ///
    /// The PostgreSQL store has its schema created if missing.
    pub async fn connect(config: &ApiConfig) -> ApiResult<Self> {
        let cache_store = open_store(&config.pipeline.cache)?;

        let subscriptions: Arc<dyn SubscriptionStore> = match config.subscription_store {
            SubscriptionBackend::Memory => Arc::new(InMemorySubscriptionStore::new()),
            SubscriptionBackend::Postgres => {
                let pg_config = config
                    .postgres
                    .as_ref()
                    .ok_or_else(|| ApiError::internal_error("PostgreSQL store selected without settings"))?;
                let store = PgSubscriptionStore::from_config(pg_config)?;
                store.ensure_schema().await?;
                Arc::new(store)
            }
        };

        Ok(Self {
            cache_store,
            broker: Arc::new(InMemoryBroker::with_retention(config.broker_retention)),
            subscriptions,
        })
    }
}

/// Background workers owned by the pipeline.
///
/// The publisher and dispatch workers exit once the last [`AppState`] clone
/// is dropped and their queues drain. The cache sweeper runs until
/// [`Workers::drain`] stops it.
#[derive(Debug)]
pub struct Workers {
    pub publisher: JoinHandle<()>,
    pub dispatch: JoinHandle<()>,
    pub cache_sweeper: JoinHandle<()>,
    dispatcher: WebhookDispatcher,
}

impl Workers {
    /// Shut the pipeline down after every [`AppState`] clone is gone.
    ///
    /// Stops the cache sweeper, waits for both queues to empty, then waits
    /// for the deliveries the dispatch worker started.
    pub async fn drain(self) {
        self.cache_sweeper.abort();
        if let Err(e) = self.publisher.await {
            tracing::warn!(error = %e, "event publisher worker ended abnormally");
        }
        if let Err(e) = self.dispatch.await {
            tracing::warn!(error = %e, "webhook dispatch worker ended abnormally");
        }
        self.dispatcher.drain().await;
        tracing::info!("mutation pipeline drained");
    }
}

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: MutationPipeline,
    pub dispatcher: WebhookDispatcher,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub start_time: Instant,
}

impl AppState {
    /// Wire the pipeline and spawn its workers. Must be called within a
    /// Tokio runtime.
    pub fn build(config: &PipelineConfig, collaborators: Collaborators) -> ApiResult<(Self, Workers)> {
        config.validate()?;
        let Collaborators {
            cache_store,
            broker,
            subscriptions,
        } = collaborators;

        let cache = CacheConsistencyManager::new(cache_store, CacheConfig::from(&config.cache));
        let cache_sweeper = cache.spawn_sweeper(config.cache.purge_interval);
        let (publisher, publisher_worker) =
            EventPublisher::spawn(broker, &config.events, Arc::new(MetricsPublishObserver));
        let dispatcher = WebhookDispatcher::new(Arc::clone(&subscriptions), &config.webhooks)?;
        let (dispatch, dispatch_worker) =
            DispatchQueue::spawn(dispatcher.clone(), config.webhooks.queue_capacity);

        tracing::info!(
            cache_backend = cache.backend_name(),
            subscription_store = subscriptions.backend_name(),
            topic = publisher.topic(),
            purge_interval_secs = config.cache.purge_interval.as_secs(),
            "mutation pipeline ready"
        );

        let workers = Workers {
            publisher: publisher_worker,
            dispatch: dispatch_worker,
            cache_sweeper,
            dispatcher: dispatcher.clone(),
        };
        let state = Self {
            pipeline: MutationPipeline::new(cache, publisher, dispatch),
            dispatcher,
            subscriptions,
            start_time: Instant::now(),
        };
        Ok((state, workers))
    }
}

crate::impl_from_ref!(MutationPipeline, pipeline);
crate::impl_from_ref!(WebhookDispatcher, dispatcher);
crate::impl_from_ref!(Arc<dyn SubscriptionStore>, subscriptions);
crate::impl_from_ref!(Instant, start_time);
