//! In-process cache store with per-entry expiry.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use atrium_core::CacheError;

use super::traits::CacheStore;

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// `RwLock<HashMap>`-backed store. Expired entries read as absent and are
/// removed on access or by [`CacheStore::purge_expired`].
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .map(|entries| entries.values().filter(|e| e.expires_at > now).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of stored entries, expired or not.
    pub fn raw_len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }
}

fn poisoned() -> CacheError {
    CacheError::Unavailable {
        reason: "cache lock poisoned".to_string(),
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let now = Instant::now();
        {
            let entries = self.entries.read().map_err(|_| poisoned())?;
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // Expired: remove unless a concurrent writer already replaced it.
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        if entries.get(key).is_some_and(|e| e.expires_at <= now) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = Instant::now() + ttl;
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, CacheError> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let removed = keys
            .iter()
            .filter(|key| entries.remove(key.as_str()).is_some())
            .count();
        Ok(removed as u64)
    }

    async fn purge_expired(&self) -> Result<u64, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        Ok((before - entries.len()) as u64)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = InMemoryCacheStore::new();
        store
            .set("workspace:1", b"{}".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(store.get("workspace:1").await.unwrap(), Some(b"{}".to_vec()));

        let removed = store
            .delete(&["workspace:1".to_string(), "workspace:2".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.get("workspace:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_entries_read_as_absent() {
        let store = InMemoryCacheStore::new();
        store
            .set("role:1", b"x".to_vec(), Duration::from_millis(20))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("role:1").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_overwrite_resets_ttl() {
        let store = InMemoryCacheStore::new();
        store
            .set("k:1", b"old".to_vec(), Duration::from_millis(20))
            .await
            .unwrap();
        store
            .set("k:1", b"new".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("k:1").await.unwrap(), Some(b"new".to_vec()));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = InMemoryCacheStore::new();
        store
            .set("a:1", vec![1], Duration::from_millis(5))
            .await
            .unwrap();
        store.set("b:1", vec![2], Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.raw_len(), 1);
    }

    #[tokio::test]
    async fn test_unread_expired_entries_are_retained_until_purged() {
        let store = InMemoryCacheStore::new();
        for i in 0..1000 {
            store
                .set(&format!("workspace_stats:{i}"), vec![0; 16], Duration::from_millis(1))
                .await
                .unwrap();
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.len(), 0);
        assert_eq!(store.raw_len(), 1000);

        assert_eq!(store.purge_expired().await.unwrap(), 1000);
        assert_eq!(store.raw_len(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_get_and_delete() {
        let store = Arc::new(InMemoryCacheStore::new());
        for i in 0..64 {
            store
                .set(&format!("member:{i}"), vec![i as u8], Duration::from_secs(60))
                .await
                .unwrap();
        }

        let mut handles = Vec::new();
        for i in 0..64 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let key = format!("member:{i}");
                let _ = store.get(&key).await.unwrap();
                store.delete(&[key.clone()]).await.unwrap();
                store.get(&key).await.unwrap()
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), None);
        }
        assert!(store.is_empty());
    }
}
