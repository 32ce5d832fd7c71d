//! LMDB-backed cache store.
//!
//! Uses the heed crate (Rust bindings for LMDB) for a memory-mapped
//! key-value store that survives process restarts and can be shared by
//! several worker processes on one host.
//!
//! # Value layout
//!
//! Each value is stored as `[expires_at_millis: 8 bytes LE][payload]`.
//! Entries whose expiry has passed read as absent and are removed on the
//! next write transaction that touches them, or by
//! [`LmdbCacheStore::remove_expired`].
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. Reads use read transactions; `set` and
//! `delete` each run in a single write transaction, so a multi-key delete
//! is atomic with respect to concurrent readers.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use atrium_core::CacheError;
use chrono::Utc;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use super::traits::CacheStore;

/// Length of the expiry prefix on every stored value.
const EXPIRY_PREFIX_LEN: usize = 8;

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbCacheError> for CacheError {
    fn from(e: LmdbCacheError) -> Self {
        match e {
            LmdbCacheError::EnvOpen(_) | LmdbCacheError::DbOpen(_) | LmdbCacheError::Io(_) => {
                CacheError::Unavailable {
                    reason: e.to_string(),
                }
            }
            LmdbCacheError::Transaction(_) => CacheError::Backend {
                reason: e.to_string(),
            },
        }
    }
}

fn txn_err(e: heed::Error) -> LmdbCacheError {
    LmdbCacheError::Transaction(e.to_string())
}

/// LMDB-backed cache store with per-entry expiry.
pub struct LmdbCacheStore {
    env: Env,
    db: Database<Bytes, Bytes>,
}

impl std::fmt::Debug for LmdbCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbCacheStore")
            .field("path", &self.env.path())
            .finish()
    }
}

impl LmdbCacheStore {
    /// Open (or create) a store.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per path by this process and
        // the mapping is never handed out beyond heed's own transactions.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_err)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_err)?;

        Ok(Self { env, db })
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn remove_expired(&self) -> Result<u64, LmdbCacheError> {
        let now = Utc::now().timestamp_millis();

        let expired: Vec<Vec<u8>> = {
            let rtxn = self.env.read_txn().map_err(txn_err)?;
            let iter = self.db.iter(&rtxn).map_err(txn_err)?;
            iter.filter_map(|entry| entry.ok())
                .filter(|(_, value)| is_expired(value, now))
                .map(|(key, _)| key.to_vec())
                .collect()
        };

        if expired.is_empty() {
            return Ok(0);
        }

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let mut removed = 0u64;
        for key in &expired {
            // Re-check under the write lock; a concurrent set may have
            // refreshed the entry since the scan.
            let still_expired = self
                .db
                .get(&wtxn, key)
                .map_err(txn_err)?
                .is_some_and(|value| is_expired(value, now));
            if still_expired && self.db.delete(&mut wtxn, key).map_err(txn_err)? {
                removed += 1;
            }
        }
        wtxn.commit().map_err(txn_err)?;

        Ok(removed)
    }

    /// Number of stored entries, expired or not.
    pub fn raw_len(&self) -> Result<u64, LmdbCacheError> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        self.db.len(&rtxn).map_err(txn_err)
    }
}

fn expires_at(value: &[u8]) -> Option<i64> {
    let prefix: [u8; EXPIRY_PREFIX_LEN] = value.get(..EXPIRY_PREFIX_LEN)?.try_into().ok()?;
    Some(i64::from_le_bytes(prefix))
}

/// Values too short to carry an expiry prefix are treated as expired.
fn is_expired(value: &[u8], now_millis: i64) -> bool {
    expires_at(value).map_or(true, |at| at <= now_millis)
}

#[async_trait]
impl CacheStore for LmdbCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let Some(bytes) = self.db.get(&rtxn, key.as_bytes()).map_err(txn_err)? else {
            return Ok(None);
        };

        if is_expired(bytes, Utc::now().timestamp_millis()) {
            return Ok(None);
        }
        Ok(Some(bytes[EXPIRY_PREFIX_LEN..].to_vec()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let ttl_millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires = Utc::now().timestamp_millis().saturating_add(ttl_millis);

        let mut full_bytes = Vec::with_capacity(EXPIRY_PREFIX_LEN + value.len());
        full_bytes.extend_from_slice(&expires.to_le_bytes());
        full_bytes.extend_from_slice(&value);

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        self.db
            .put(&mut wtxn, key.as_bytes(), &full_bytes)
            .map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let mut deleted = 0u64;
        for key in keys {
            if self.db.delete(&mut wtxn, key.as_bytes()).map_err(txn_err)? {
                deleted += 1;
            }
        }
        wtxn.commit().map_err(txn_err)?;
        Ok(deleted)
    }

    async fn purge_expired(&self) -> Result<u64, CacheError> {
        Ok(self.remove_expired()?)
    }

    fn backend_name(&self) -> &'static str {
        "lmdb"
    }
}
