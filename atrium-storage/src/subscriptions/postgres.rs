//! PostgreSQL subscription store.
//!
//! Counter updates are single `UPDATE … RETURNING` statements so concurrent
//! deliveries for the same subscription never lose an increment.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use atrium_core::{
    env_parse, ConfigError, EventType, StorageError, SubscriptionId, Timestamp,
    WebhookSubscription, WorkspaceId,
};
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio_postgres::{NoTls, Row};

use super::SubscriptionStore;

/// Table definition applied by [`PgSubscriptionStore::ensure_schema`].
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS webhook_subscriptions (
    id                UUID PRIMARY KEY,
    workspace_id      UUID NOT NULL,
    url               TEXT NOT NULL,
    secret            TEXT NOT NULL,
    event_types       TEXT[] NOT NULL,
    active            BOOLEAN NOT NULL DEFAULT TRUE,
    failure_count     BIGINT NOT NULL DEFAULT 0,
    success_count     BIGINT NOT NULL DEFAULT 0,
    last_triggered_at TIMESTAMPTZ,
    created_at        TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS webhook_subscriptions_workspace_idx
    ON webhook_subscriptions (workspace_id);
"#;

const COLUMNS: &str = "id, workspace_id, url, secret, event_types, active, failure_count, \
                       success_count, last_triggered_at, created_at";

/// Connection pool configuration.
#[derive(Debug, Clone)]
pub struct PgStoreConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Wait timeout for a pooled connection
    pub timeout: Duration,
}

impl Default for PgStoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "atrium".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl PgStoreConfig {
    /// Load from `ATRIUM_DB_HOST`, `ATRIUM_DB_PORT`, `ATRIUM_DB_NAME`,
    /// `ATRIUM_DB_USER`, `ATRIUM_DB_PASSWORD`, `ATRIUM_DB_POOL_SIZE` and
    /// `ATRIUM_DB_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            host: env_parse("ATRIUM_DB_HOST", defaults.host)?,
            port: env_parse("ATRIUM_DB_PORT", defaults.port)?,
            dbname: env_parse("ATRIUM_DB_NAME", defaults.dbname)?,
            user: env_parse("ATRIUM_DB_USER", defaults.user)?,
            password: env_parse("ATRIUM_DB_PASSWORD", defaults.password)?,
            max_size: env_parse("ATRIUM_DB_POOL_SIZE", defaults.max_size)?,
            timeout: Duration::from_secs(env_parse(
                "ATRIUM_DB_TIMEOUT_SECS",
                defaults.timeout.as_secs(),
            )?),
        })
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> Result<Pool, StorageError> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        let mut pool_cfg = deadpool_postgres::PoolConfig::new(self.max_size);
        pool_cfg.timeouts.wait = Some(self.timeout);
        cfg.pool = Some(pool_cfg);

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| backend_err("create_pool", e))
    }
}

fn backend_err(operation: &str, e: impl std::fmt::Display) -> StorageError {
    StorageError::Backend {
        operation: operation.to_string(),
        reason: e.to_string(),
    }
}

/// Subscription store backed by a `webhook_subscriptions` table.
#[derive(Clone)]
pub struct PgSubscriptionStore {
    pool: Pool,
}

impl std::fmt::Debug for PgSubscriptionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgSubscriptionStore")
            .field("pool_size", &self.pool.status().size)
            .finish()
    }
}

impl PgSubscriptionStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn from_config(config: &PgStoreConfig) -> Result<Self, StorageError> {
        Ok(Self::new(config.create_pool()?))
    }

    /// Create the table and index if they do not exist.
    pub async fn ensure_schema(&self) -> Result<(), StorageError> {
        let client = self.client("ensure_schema").await?;
        client
            .batch_execute(SCHEMA)
            .await
            .map_err(|e| backend_err("ensure_schema", e))
    }

    async fn client(&self, operation: &str) -> Result<deadpool_postgres::Object, StorageError> {
        self.pool.get().await.map_err(|e| backend_err(operation, e))
    }
}

fn counter(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn row_to_subscription(row: &Row) -> Result<WebhookSubscription, StorageError> {
    let raw_types: Vec<String> = row.try_get("event_types").map_err(|e| backend_err("decode", e))?;
    let event_types: BTreeSet<EventType> = raw_types
        .iter()
        .map(|raw| EventType::parse(raw))
        .collect::<Result<_, _>>()
        .map_err(|e| backend_err("decode", e))?;

    let get = |e: tokio_postgres::Error| backend_err("decode", e);
    Ok(WebhookSubscription {
        id: row.try_get("id").map_err(get)?,
        workspace_id: row.try_get("workspace_id").map_err(get)?,
        url: row.try_get("url").map_err(get)?,
        secret: row.try_get("secret").map_err(get)?,
        event_types,
        active: row.try_get("active").map_err(get)?,
        failure_count: counter(row.try_get("failure_count").map_err(get)?),
        success_count: counter(row.try_get("success_count").map_err(get)?),
        last_triggered_at: row.try_get("last_triggered_at").map_err(get)?,
        created_at: row.try_get("created_at").map_err(get)?,
    })
}

#[async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    async fn insert(&self, subscription: WebhookSubscription) -> Result<(), StorageError> {
        let client = self.client("insert").await?;
        let event_types: Vec<String> = subscription
            .event_types
            .iter()
            .map(|t| t.as_str().to_string())
            .collect();
        let failure_count = i64::try_from(subscription.failure_count).unwrap_or(i64::MAX);
        let success_count = i64::try_from(subscription.success_count).unwrap_or(i64::MAX);

        let inserted = client
            .execute(
                &*format!(
                    "INSERT INTO webhook_subscriptions ({COLUMNS}) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
                     ON CONFLICT (id) DO NOTHING"
                ),
                &[
                    &subscription.id,
                    &subscription.workspace_id,
                    &subscription.url,
                    &subscription.secret,
                    &event_types,
                    &subscription.active,
                    &failure_count,
                    &success_count,
                    &subscription.last_triggered_at,
                    &subscription.created_at,
                ],
            )
            .await
            .map_err(|e| backend_err("insert", e))?;

        if inserted == 0 {
            return Err(StorageError::AlreadyExists {
                id: subscription.id,
            });
        }
        Ok(())
    }

    async fn get(&self, id: SubscriptionId) -> Result<Option<WebhookSubscription>, StorageError> {
        let client = self.client("get").await?;
        let row = client
            .query_opt(
                &*format!("SELECT {COLUMNS} FROM webhook_subscriptions WHERE id = $1"),
                &[&id],
            )
            .await
            .map_err(|e| backend_err("get", e))?;
        row.as_ref().map(row_to_subscription).transpose()
    }

    async fn remove(&self, id: SubscriptionId) -> Result<Option<WebhookSubscription>, StorageError> {
        let client = self.client("remove").await?;
        let row = client
            .query_opt(
                &*format!("DELETE FROM webhook_subscriptions WHERE id = $1 RETURNING {COLUMNS}"),
                &[&id],
            )
            .await
            .map_err(|e| backend_err("remove", e))?;
        row.as_ref().map(row_to_subscription).transpose()
    }

    async fn list(&self, workspace_id: WorkspaceId) -> Result<Vec<WebhookSubscription>, StorageError> {
        let client = self.client("list").await?;
        let rows = client
            .query(
                &*format!(
                    "SELECT {COLUMNS} FROM webhook_subscriptions \
                     WHERE workspace_id = $1 ORDER BY created_at, id"
                ),
                &[&workspace_id],
            )
            .await
            .map_err(|e| backend_err("list", e))?;
        rows.iter().map(row_to_subscription).collect()
    }

    async fn matching(
        &self,
        workspace_id: WorkspaceId,
        event_type: &EventType,
    ) -> Result<Vec<WebhookSubscription>, StorageError> {
        let client = self.client("matching").await?;
        let rows = client
            .query(
                &*format!(
                    "SELECT {COLUMNS} FROM webhook_subscriptions \
                     WHERE workspace_id = $1 AND active AND $2 = ANY(event_types)"
                ),
                &[&workspace_id, &event_type.as_str()],
            )
            .await
            .map_err(|e| backend_err("matching", e))?;
        rows.iter().map(row_to_subscription).collect()
    }

    async fn record_success(&self, id: SubscriptionId, at: Timestamp) -> Result<(), StorageError> {
        let client = self.client("record_success").await?;
        let updated = client
            .execute(
                "UPDATE webhook_subscriptions \
                 SET failure_count = 0, success_count = success_count + 1, last_triggered_at = $2 \
                 WHERE id = $1",
                &[&id, &at],
            )
            .await
            .map_err(|e| backend_err("record_success", e))?;
        if updated == 0 {
            return Err(StorageError::SubscriptionNotFound { id });
        }
        Ok(())
    }

    async fn record_failure(&self, id: SubscriptionId) -> Result<u64, StorageError> {
        let client = self.client("record_failure").await?;
        let row = client
            .query_opt(
                "UPDATE webhook_subscriptions SET failure_count = failure_count + 1 \
                 WHERE id = $1 RETURNING failure_count",
                &[&id],
            )
            .await
            .map_err(|e| backend_err("record_failure", e))?
            .ok_or(StorageError::SubscriptionNotFound { id })?;
        let count: i64 = row
            .try_get(0)
            .map_err(|e| backend_err("record_failure", e))?;
        Ok(counter(count))
    }

    async fn set_active(&self, id: SubscriptionId, active: bool) -> Result<(), StorageError> {
        let client = self.client("set_active").await?;
        let updated = client
            .execute(
                "UPDATE webhook_subscriptions SET active = $2 WHERE id = $1",
                &[&id, &active],
            )
            .await
            .map_err(|e| backend_err("set_active", e))?;
        if updated == 0 {
            return Err(StorageError::SubscriptionNotFound { id });
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PgStoreConfig::default();
        assert_eq!(config.port, 5432);
        assert_eq!(config.dbname, "atrium");
        assert_eq!(config.max_size, 16);
    }

    #[test]
    fn test_schema_declares_counters() {
        assert!(SCHEMA.contains("failure_count     BIGINT NOT NULL DEFAULT 0"));
        assert!(SCHEMA.contains("event_types       TEXT[] NOT NULL"));
    }

    #[test]
    fn test_negative_counter_clamps_to_zero() {
        assert_eq!(counter(-3), 0);
        assert_eq!(counter(7), 7);
    }

    #[cfg(feature = "db-tests")]
    mod db {
        use super::*;
        use chrono::Utc;
        use uuid::Uuid;

        async fn store() -> PgSubscriptionStore {
            let config = PgStoreConfig::from_env().expect("db config");
            let store = PgSubscriptionStore::from_config(&config).expect("pool");
            store.ensure_schema().await.expect("schema");
            store
        }

        #[tokio::test]
        async fn test_roundtrip_and_matching() {
            let store = store().await;
            let ws = Uuid::now_v7();
            let sub = WebhookSubscription::new(
                ws,
                "https://hooks.example.com/pg",
                "0123456789abcdef",
                [EventType::MEMBER_JOINED],
            );
            let id = sub.id;
            store.insert(sub.clone()).await.expect("insert");

            let loaded = store.get(id).await.expect("get").expect("present");
            assert_eq!(loaded.url, sub.url);
            assert_eq!(loaded.secret, sub.secret);

            let matched = store
                .matching(ws, &EventType::MEMBER_JOINED)
                .await
                .expect("matching");
            assert_eq!(matched.len(), 1);
            assert!(store
                .matching(ws, &EventType::WORKSPACE_UPDATED)
                .await
                .expect("matching")
                .is_empty());

            store.remove(id).await.expect("remove");
        }

        #[tokio::test]
        async fn test_counter_updates_are_atomic() {
            let store = store().await;
            let sub = WebhookSubscription::new(
                Uuid::now_v7(),
                "https://hooks.example.com/pg",
                "0123456789abcdef",
                [EventType::WORKSPACE_UPDATED],
            );
            let id = sub.id;
            store.insert(sub).await.expect("insert");

            let handles: Vec<_> = (0..20)
                .map(|_| {
                    let store = store.clone();
                    tokio::spawn(async move { store.record_failure(id).await })
                })
                .collect();
            for handle in handles {
                handle.await.expect("join").expect("record_failure");
            }
            assert_eq!(store.get(id).await.expect("get").expect("present").failure_count, 20);

            store.record_success(id, Utc::now()).await.expect("success");
            let loaded = store.get(id).await.expect("get").expect("present");
            assert_eq!(loaded.failure_count, 0);
            assert_eq!(loaded.success_count, 1);

            store.remove(id).await.expect("remove");
        }
    }
}
