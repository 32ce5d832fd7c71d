//! Pipeline configuration.
//!
//! Loaded from environment variables with defaults suitable for local
//! development. Call [`PipelineConfig::validate`] before wiring components.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Delivery timeout for a single webhook callback.
pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time-to-live for read-populated cache entries.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Default broker topic for domain events.
pub const DEFAULT_EVENTS_TOPIC: &str = "atrium.domain-events";

/// Default upper bound on one broker publish.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Default interval between sweeps of expired cache entries.
pub const DEFAULT_CACHE_PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Default capacity of the publish and dispatch queues.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Which cache store backs the cache manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackendKind {
    Memory,
    Lmdb,
}

impl FromStr for CacheBackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "lmdb" => Ok(Self::Lmdb),
            other => Err(ConfigError::InvalidValue {
                field: "ATRIUM_CACHE_BACKEND".to_string(),
                value: other.to_string(),
                reason: "expected `memory` or `lmdb`".to_string(),
            }),
        }
    }
}

/// Cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    pub backend: CacheBackendKind,
    /// Directory for the LMDB environment
    pub lmdb_path: PathBuf,
    /// Maximum LMDB map size in megabytes
    pub lmdb_max_size_mb: usize,
    pub default_ttl: Duration,
    /// How often expired entries that nobody reads again are swept
    pub purge_interval: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Memory,
            lmdb_path: PathBuf::from("./data/cache"),
            lmdb_max_size_mb: 256,
            default_ttl: DEFAULT_CACHE_TTL,
            purge_interval: DEFAULT_CACHE_PURGE_INTERVAL,
        }
    }
}

/// Event publication settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSettings {
    pub topic: String,
    pub queue_capacity: usize,
    pub publish_timeout: Duration,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            topic: DEFAULT_EVENTS_TOPIC.to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }
}

/// Webhook delivery settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookSettings {
    pub delivery_timeout: Duration,
    pub queue_capacity: usize,
    pub user_agent: String,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            delivery_timeout: DEFAULT_WEBHOOK_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            user_agent: concat!("atrium-webhooks/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Master configuration for the side-effect pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub cache: CacheSettings,
    pub events: EventSettings,
    pub webhooks: WebhookSettings,
}

impl PipelineConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `ATRIUM_CACHE_BACKEND`: `memory` or `lmdb` (default: memory)
    /// - `ATRIUM_CACHE_PATH`: LMDB directory (default: ./data/cache)
    /// - `ATRIUM_CACHE_MAX_SIZE_MB`: LMDB map size (default: 256)
    /// - `ATRIUM_CACHE_TTL_SECS`: entry TTL (default: 300)
    /// - `ATRIUM_CACHE_PURGE_INTERVAL_SECS`: expired-entry sweep interval (default: 60)
    /// - `ATRIUM_EVENTS_TOPIC`: broker topic (default: atrium.domain-events)
    /// - `ATRIUM_EVENTS_QUEUE_CAPACITY`: publish queue size (default: 1024)
    /// - `ATRIUM_EVENTS_PUBLISH_TIMEOUT_SECS`: broker publish timeout (default: 5)
    /// - `ATRIUM_WEBHOOK_TIMEOUT_SECS`: delivery timeout (default: 10)
    /// - `ATRIUM_WEBHOOK_QUEUE_CAPACITY`: dispatch queue size (default: 1024)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let backend = match std::env::var("ATRIUM_CACHE_BACKEND") {
            Ok(raw) => raw.parse()?,
            Err(_) => defaults.cache.backend,
        };

        let config = Self {
            cache: CacheSettings {
                backend,
                lmdb_path: std::env::var("ATRIUM_CACHE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.cache.lmdb_path),
                lmdb_max_size_mb: env_parse(
                    "ATRIUM_CACHE_MAX_SIZE_MB",
                    defaults.cache.lmdb_max_size_mb,
                )?,
                default_ttl: Duration::from_secs(env_parse(
                    "ATRIUM_CACHE_TTL_SECS",
                    defaults.cache.default_ttl.as_secs(),
                )?),
                purge_interval: Duration::from_secs(env_parse(
                    "ATRIUM_CACHE_PURGE_INTERVAL_SECS",
                    defaults.cache.purge_interval.as_secs(),
                )?),
            },
            events: EventSettings {
                topic: std::env::var("ATRIUM_EVENTS_TOPIC").unwrap_or(defaults.events.topic),
                queue_capacity: env_parse(
                    "ATRIUM_EVENTS_QUEUE_CAPACITY",
                    defaults.events.queue_capacity,
                )?,
                publish_timeout: Duration::from_secs(env_parse(
                    "ATRIUM_EVENTS_PUBLISH_TIMEOUT_SECS",
                    defaults.events.publish_timeout.as_secs(),
                )?),
            },
            webhooks: WebhookSettings {
                delivery_timeout: Duration::from_secs(env_parse(
                    "ATRIUM_WEBHOOK_TIMEOUT_SECS",
                    defaults.webhooks.delivery_timeout.as_secs(),
                )?),
                queue_capacity: env_parse(
                    "ATRIUM_WEBHOOK_QUEUE_CAPACITY",
                    defaults.webhooks.queue_capacity,
                )?,
                user_agent: defaults.webhooks.user_agent,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would silently disable a component.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.default_ttl.is_zero() {
            return Err(invalid("cache.default_ttl", "0", "must be positive"));
        }
        if self.cache.purge_interval.is_zero() {
            return Err(invalid("cache.purge_interval", "0", "must be positive"));
        }
        if self.cache.backend == CacheBackendKind::Lmdb && self.cache.lmdb_max_size_mb == 0 {
            return Err(invalid("cache.lmdb_max_size_mb", "0", "must be positive"));
        }
        if self.events.topic.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "events.topic".to_string(),
            });
        }
        if self.events.queue_capacity == 0 {
            return Err(invalid("events.queue_capacity", "0", "must be positive"));
        }
        if self.events.publish_timeout.is_zero() {
            return Err(invalid("events.publish_timeout", "0", "must be positive"));
        }
        if self.webhooks.delivery_timeout.is_zero() {
            return Err(invalid("webhooks.delivery_timeout", "0", "must be positive"));
        }
        if self.webhooks.queue_capacity == 0 {
            return Err(invalid("webhooks.queue_capacity", "0", "must be positive"));
        }
        Ok(())
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Parse an optional environment variable, falling back to `default` when unset.
pub fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            field: key.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.webhooks.delivery_timeout, Duration::from_secs(10));
        assert_eq!(config.events.topic, "atrium.domain-events");
        assert!(config.webhooks.user_agent.starts_with("atrium-webhooks/"));
    }

    #[test]
    fn test_zero_values_rejected() {
        let mut config = PipelineConfig::default();
        config.webhooks.delivery_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.events.queue_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.cache.default_ttl = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.cache.purge_interval = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.events.publish_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cache_backend_parse() {
        assert_eq!("LMDB".parse::<CacheBackendKind>().unwrap(), CacheBackendKind::Lmdb);
        assert_eq!(" memory ".parse::<CacheBackendKind>().unwrap(), CacheBackendKind::Memory);
        assert!("redis".parse::<CacheBackendKind>().is_err());
    }

    #[test]
    fn test_env_parse_falls_back_when_unset() {
        let value: u64 = env_parse("ATRIUM_TEST_SURELY_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
    }
}
