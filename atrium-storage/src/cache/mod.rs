//! Cache layer: keys, stores and the consistency manager.
//!
//! Reads go through [`CacheConsistencyManager`], which treats every store
//! failure as a miss. Mutations invalidate the entity's
//! [`InvalidationGroup`]; nothing ever writes a fresh value on the write
//! path.
//!
//! # Example
//!
//! ```ignore
//! let cache = CacheConsistencyManager::with_defaults(Arc::new(InMemoryCacheStore::new()));
//!
//! let stats = cache
//!     .get_or_load(&CacheKey::new(EntityKind::WorkspaceStats, ws), || db.workspace_stats(ws))
//!     .await?;
//!
//! // after the rename commits
//! cache.invalidate_group(&EntityRef::workspace(ws)).await;
//! ```

pub mod key;
pub mod lmdb_backend;
pub mod manager;
pub mod memory;
pub mod traits;

use std::sync::Arc;

use atrium_core::{CacheBackendKind, CacheError, CacheSettings};

pub use key::{CacheKey, InvalidationGroup};
pub use lmdb_backend::{LmdbCacheError, LmdbCacheStore};
pub use manager::{CacheConfig, CacheConsistencyManager, InvalidationReport};
pub use memory::InMemoryCacheStore;
pub use traits::{CacheStats, CacheStore};

/// Open the store selected by `settings`.
pub fn open_store(settings: &CacheSettings) -> Result<Arc<dyn CacheStore>, CacheError> {
    match settings.backend {
        CacheBackendKind::Memory => Ok(Arc::new(InMemoryCacheStore::new())),
        CacheBackendKind::Lmdb => {
            let store = LmdbCacheStore::open(&settings.lmdb_path, settings.lmdb_max_size_mb)?;
            tracing::info!(path = %settings.lmdb_path.display(), "opened LMDB cache store");
            Ok(Arc::new(store))
        }
    }
}
