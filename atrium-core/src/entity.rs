//! Entity kinds and references used to address cached state.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::identity::{EntityId, WorkspaceId};

/// Kinds of hot entities and aggregates that are served through the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A workspace record.
    Workspace,
    /// Aggregate statistics computed per workspace (member counts, usage).
    WorkspaceStats,
    /// The member listing of a workspace.
    WorkspaceMembers,
    /// A single membership record.
    Member,
    /// A role definition.
    Role,
    /// The billing account attached to a workspace.
    BillingAccount,
}

impl EntityKind {
    /// Stable lowercase name used in cache keys and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Workspace => "workspace",
            EntityKind::WorkspaceStats => "workspace_stats",
            EntityKind::WorkspaceMembers => "workspace_members",
            EntityKind::Member => "member",
            EntityKind::Role => "role",
            EntityKind::BillingAccount => "billing_account",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a mutated entity instance.
///
/// Carries enough context (the owning workspace) to derive every cache key
/// that embeds or is computed from the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityRef {
    Workspace {
        workspace_id: WorkspaceId,
    },
    Member {
        member_id: EntityId,
        workspace_id: WorkspaceId,
    },
    Role {
        role_id: EntityId,
    },
    BillingAccount {
        account_id: EntityId,
        workspace_id: WorkspaceId,
    },
}

impl EntityRef {
    pub fn workspace(workspace_id: WorkspaceId) -> Self {
        Self::Workspace { workspace_id }
    }

    pub fn member(member_id: EntityId, workspace_id: WorkspaceId) -> Self {
        Self::Member {
            member_id,
            workspace_id,
        }
    }

    pub fn role(role_id: EntityId) -> Self {
        Self::Role { role_id }
    }

    pub fn billing_account(account_id: EntityId, workspace_id: WorkspaceId) -> Self {
        Self::BillingAccount {
            account_id,
            workspace_id,
        }
    }

    /// The kind of the referenced entity itself.
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityRef::Workspace { .. } => EntityKind::Workspace,
            EntityRef::Member { .. } => EntityKind::Member,
            EntityRef::Role { .. } => EntityKind::Role,
            EntityRef::BillingAccount { .. } => EntityKind::BillingAccount,
        }
    }

    /// The identifier of the referenced entity itself.
    pub fn id(&self) -> EntityId {
        match self {
            EntityRef::Workspace { workspace_id } => *workspace_id,
            EntityRef::Member { member_id, .. } => *member_id,
            EntityRef::Role { role_id } => *role_id,
            EntityRef::BillingAccount { account_id, .. } => *account_id,
        }
    }

    /// The workspace that owns the entity, if it is workspace-scoped.
    pub fn workspace_id(&self) -> Option<WorkspaceId> {
        match self {
            EntityRef::Workspace { workspace_id }
            | EntityRef::Member { workspace_id, .. }
            | EntityRef::BillingAccount { workspace_id, .. } => Some(*workspace_id),
            EntityRef::Role { .. } => None,
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}
