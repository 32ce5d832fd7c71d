//! API Configuration Module
//!
//! Server-level settings layered on top of the pipeline's own
//! [`PipelineConfig`]. Everything is read from environment variables with
//! defaults suitable for local development.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use atrium_core::{env_parse, ConfigError, PipelineConfig};
use atrium_storage::PgStoreConfig;

/// Which store holds webhook subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionBackend {
    Memory,
    Postgres,
}

impl FromStr for SubscriptionBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(ConfigError::InvalidValue {
                field: "ATRIUM_SUBSCRIPTION_STORE".to_string(),
                value: other.to_string(),
                reason: "expected `memory` or `postgres`".to_string(),
            }),
        }
    }
}

/// Configuration for the Atrium server binary.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,

    pub subscription_store: SubscriptionBackend,

    /// Only read when `subscription_store` is `Postgres`.
    pub postgres: Option<PgStoreConfig>,

    /// Allowed CORS origins. Empty means allow all (dev mode).
    pub cors_origins: Vec<String>,

    /// Upper bound on admin request handling time.
    pub request_timeout: Duration,

    /// Maximum accepted request body size in bytes.
    pub max_body_bytes: usize,

    /// Records kept per topic by the in-process broker.
    pub broker_retention: usize,

    pub pipeline: PipelineConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            subscription_store: SubscriptionBackend::Memory,
            postgres: None,
            cors_origins: Vec::new(),
            request_timeout: Duration::from_secs(30),
            max_body_bytes: 1024 * 1024,
            broker_retention: 10_000,
            pipeline: PipelineConfig::default(),
        }
    }
}

impl ApiConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `ATRIUM_BIND_ADDR`: listen address (default: 0.0.0.0:3000)
    /// - `ATRIUM_SUBSCRIPTION_STORE`: `memory` or `postgres` (default: memory)
    /// - `ATRIUM_CORS_ORIGINS`: comma-separated origins (default: allow all)
    /// - `ATRIUM_REQUEST_TIMEOUT_SECS`: admin request timeout (default: 30)
    /// - `ATRIUM_MAX_BODY_BYTES`: request body limit (default: 1 MiB)
    /// - `ATRIUM_BROKER_RETENTION`: records kept per topic (default: 10000)
    ///
    /// plus everything read by [`PipelineConfig::from_env`] and, for the
    /// postgres store, [`PgStoreConfig::from_env`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let subscription_store: SubscriptionBackend =
            env_parse("ATRIUM_SUBSCRIPTION_STORE", defaults.subscription_store)?;
        let postgres = match subscription_store {
            SubscriptionBackend::Postgres => Some(PgStoreConfig::from_env()?),
            SubscriptionBackend::Memory => None,
        };

        let cors_origins = std::env::var("ATRIUM_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let config = Self {
            bind_addr: env_parse("ATRIUM_BIND_ADDR", defaults.bind_addr)?,
            subscription_store,
            postgres,
            cors_origins,
            request_timeout: Duration::from_secs(env_parse(
                "ATRIUM_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
            max_body_bytes: env_parse("ATRIUM_MAX_BODY_BYTES", defaults.max_body_bytes)?,
            broker_retention: env_parse("ATRIUM_BROKER_RETENTION", defaults.broker_retention)?,
            pipeline: PipelineConfig::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "ATRIUM_REQUEST_TIMEOUT_SECS".to_string(),
                value: "0".to_string(),
                reason: "must be at least one second".to_string(),
            });
        }
        if self.request_timeout <= self.pipeline.webhooks.delivery_timeout {
            return Err(ConfigError::InvalidValue {
                field: "ATRIUM_REQUEST_TIMEOUT_SECS".to_string(),
                value: self.request_timeout.as_secs().to_string(),
                reason: "must exceed the webhook delivery timeout so test deliveries can finish"
                    .to_string(),
            });
        }
        if self.broker_retention == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ATRIUM_BROKER_RETENTION".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.subscription_store == SubscriptionBackend::Postgres && self.postgres.is_none() {
            return Err(ConfigError::MissingRequired {
                field: "ATRIUM_DB_HOST".to_string(),
            });
        }
        self.pipeline.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ApiConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.subscription_store, SubscriptionBackend::Memory);
    }

    #[test]
    fn test_subscription_backend_parsing() {
        assert_eq!("Postgres".parse::<SubscriptionBackend>().unwrap(), SubscriptionBackend::Postgres);
        assert_eq!(" memory ".parse::<SubscriptionBackend>().unwrap(), SubscriptionBackend::Memory);
        assert!("redis".parse::<SubscriptionBackend>().is_err());
    }

    #[test]
    fn test_request_timeout_must_cover_test_delivery() {
        let config = ApiConfig {
            request_timeout: Duration::from_secs(5),
            ..ApiConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_postgres_without_settings_is_rejected() {
        let config = ApiConfig {
            subscription_store: SubscriptionBackend::Postgres,
            ..ApiConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingRequired { .. })
        ));
    }
}
