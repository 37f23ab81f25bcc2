//! Point-in-time view of the catalog and one role's edge set.
//!
//! A snapshot is fetched once per logical request (one read transaction) and
//! handed to the resolver explicitly, so every capability checked within that
//! request sees the same catalog even while an administrator edits roles.

use std::collections::{BTreeMap, HashSet};

use guardian_core::PermissionId;

use crate::{Permission, PermissionCode, Role};

/// A role together with the permission ids it grants.
///
/// Edges are kept even when the referenced permission is inactive; resolution
/// filters on the permission's active flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGrants {
    pub role: Role,
    pub granted: HashSet<PermissionId>,
}

impl RoleGrants {
    pub fn grants(&self, permission: &Permission) -> bool {
        self.granted.contains(&permission.id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicySnapshot {
    /// Whole catalog keyed by code, including inactive permissions.
    pub catalog: BTreeMap<PermissionCode, Permission>,
    /// The principal's role as stored at snapshot time. `None` when the role
    /// no longer exists (e.g. deleted after the token was issued).
    pub role: Option<RoleGrants>,
}

impl PolicySnapshot {
    pub fn new(catalog: impl IntoIterator<Item = Permission>, role: Option<RoleGrants>) -> Self {
        Self {
            catalog: catalog.into_iter().map(|p| (p.code.clone(), p)).collect(),
            role,
        }
    }

    pub fn permission(&self, code: &PermissionCode) -> Option<&Permission> {
        self.catalog.get(code)
    }

    /// Permission lookup restricted to active entries.
    pub fn active_permission(&self, code: &PermissionCode) -> Option<&Permission> {
        self.permission(code).filter(|p| p.is_active)
    }

    pub fn active_permissions(&self) -> impl Iterator<Item = &Permission> {
        self.catalog.values().filter(|p| p.is_active)
    }
}
