//! Cache keys and invalidation groups.
//!
//! Every cached value is addressed by a [`CacheKey`] of the form
//! `{kind}:{id}`. An [`InvalidationGroup`] is the full set of keys that must
//! be removed when one entity is mutated: the entity's own key plus every
//! aggregate that embeds or is computed from it.

use std::fmt;

use atrium_core::{EntityKind, EntityRef};

/// Separator between kind and identifier in the encoded key.
const SEPARATOR: char = ':';

/// A cache key addressing one entity instance or aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    kind: EntityKind,
    id: String,
}

impl CacheKey {
    pub fn new(kind: EntityKind, id: impl fmt::Display) -> Self {
        Self {
            kind,
            id: id.to_string(),
        }
    }

    /// The key of the referenced entity itself.
    pub fn for_entity(entity: &EntityRef) -> Self {
        Self::new(entity.kind(), entity.id())
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Encode to the string form used by cache stores.
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.kind.as_str(), SEPARATOR, self.id)
    }
}

/// The set of cache keys derived from one entity.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InvalidationGroup {
    keys: Vec<CacheKey>,
}

impl InvalidationGroup {
    /// Derive the group for a mutated entity.
    ///
    /// | Entity | Keys |
    /// |--------|------|
    /// | workspace `w` | `workspace:w`, `workspace_stats:w`, `workspace_members:w` |
    /// | member `m` of `w` | `member:m`, `workspace_members:w`, `workspace_stats:w` |
    /// | role `r` | `role:r` |
    /// | billing account `b` of `w` | `billing_account:b`, `workspace_stats:w` |
    pub fn for_entity(entity: &EntityRef) -> Self {
        let own = CacheKey::for_entity(entity);
        let keys = match *entity {
            EntityRef::Workspace { workspace_id } => vec![
                own,
                CacheKey::new(EntityKind::WorkspaceStats, workspace_id),
                CacheKey::new(EntityKind::WorkspaceMembers, workspace_id),
            ],
            EntityRef::Member { workspace_id, .. } => vec![
                own,
                CacheKey::new(EntityKind::WorkspaceMembers, workspace_id),
                CacheKey::new(EntityKind::WorkspaceStats, workspace_id),
            ],
            EntityRef::Role { .. } => vec![own],
            EntityRef::BillingAccount { workspace_id, .. } => vec![
                own,
                CacheKey::new(EntityKind::WorkspaceStats, workspace_id),
            ],
        };
        Self { keys }
    }

    /// Add extra keys, skipping duplicates. Insertion order is preserved.
    pub fn with_keys(mut self, extra: impl IntoIterator<Item = CacheKey>) -> Self {
        for key in extra {
            if !self.keys.contains(&key) {
                self.keys.push(key);
            }
        }
        self
    }

    pub fn keys(&self) -> &[CacheKey] {
        &self.keys
    }

    pub fn encoded(&self) -> Vec<String> {
        self.keys.iter().map(CacheKey::encode).collect()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_key_encoding() {
        let id = Uuid::now_v7();
        let key = CacheKey::new(EntityKind::WorkspaceStats, id);
        assert_eq!(key.encode(), format!("workspace_stats:{}", id));
        assert_eq!(key.kind(), EntityKind::WorkspaceStats);
        assert_eq!(key.id(), id.to_string());
    }

    #[test]
    fn test_workspace_group_includes_stats() {
        let ws = Uuid::now_v7();
        let group = InvalidationGroup::for_entity(&EntityRef::workspace(ws));

        assert_eq!(group.len(), 3);
        assert!(group
            .keys()
            .contains(&CacheKey::new(EntityKind::WorkspaceStats, ws)));
        assert_eq!(group.keys()[0], CacheKey::new(EntityKind::Workspace, ws));
    }

    #[test]
    fn test_member_group_touches_workspace_aggregates() {
        let ws = Uuid::now_v7();
        let member = Uuid::now_v7();
        let group = InvalidationGroup::for_entity(&EntityRef::member(member, ws));

        let encoded = group.encoded();
        assert!(encoded.contains(&format!("member:{}", member)));
        assert!(encoded.contains(&format!("workspace_members:{}", ws)));
        assert!(encoded.contains(&format!("workspace_stats:{}", ws)));
        assert!(!encoded.contains(&format!("workspace:{}", ws)));
    }

    #[test]
    fn test_with_keys_deduplicates() {
        let ws = Uuid::now_v7();
        let group = InvalidationGroup::for_entity(&EntityRef::workspace(ws)).with_keys([
            CacheKey::new(EntityKind::WorkspaceStats, ws),
            CacheKey::new(EntityKind::Role, "owner"),
        ]);
        assert_eq!(group.len(), 4);
    }
}
