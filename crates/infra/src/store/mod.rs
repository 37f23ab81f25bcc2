//! Persistence ports for the catalog, the role registry and the user
//! directory.
//!
//! Every mutation is applied atomically by the adapter (one lock scope or one
//! transaction), so no concurrent snapshot observes a partially updated edge
//! set.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use guardian_auth::{
    Permission, PermissionCode, PermissionFilter, PolicySnapshot, Principal, RbacError, Role,
    RoleChanges, RoleCode, RoleFilter, RoleGrants,
};
use guardian_core::{PermissionId, RoleId, UserId};

pub use in_memory::InMemoryRbacStore;
pub use postgres::PostgresRbacStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or returned garbage.
    #[error("backend error: {0}")]
    Backend(String),

    /// The mutation violated a registry rule.
    #[error(transparent)]
    Rejected(#[from] RbacError),
}

impl From<StoreError> for RbacError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Backend(msg) => RbacError::store(msg),
            StoreError::Rejected(err) => err,
        }
    }
}

/// Result of an idempotent catalog seed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub permissions_inserted: usize,
    pub roles_inserted: usize,
}

/// Built-in role to seed, with the codes of its default edges.
#[derive(Debug, Clone)]
pub struct RoleSeed {
    pub role: Role,
    pub grants: Vec<PermissionCode>,
}

/// Catalog and role registry.
#[async_trait::async_trait]
pub trait RbacStore: Send + Sync {
    /// Whole catalog plus the edge set of `role`, read consistently.
    async fn snapshot_for_role(&self, role: &RoleCode) -> Result<PolicySnapshot, StoreError>;

    async fn permission_by_code(&self, code: &PermissionCode) -> Result<Option<Permission>, StoreError>;

    /// Lookup by code, soft-deleted roles included.
    async fn role_by_code(&self, code: &RoleCode) -> Result<Option<RoleGrants>, StoreError>;

    async fn role_by_id(&self, id: RoleId) -> Result<Option<RoleGrants>, StoreError>;

    /// Ordered by category, then name.
    async fn list_permissions(&self, filter: PermissionFilter) -> Result<Vec<Permission>, StoreError>;

    /// Ordered by name.
    async fn list_roles(&self, filter: RoleFilter) -> Result<Vec<RoleGrants>, StoreError>;

    /// Insert a validated role with its edge set.
    ///
    /// Fails with `Conflict{field:"code"}` when the code is taken (soft-deleted
    /// roles included) and with `Validation` when any permission id is unknown
    /// or inactive.
    async fn insert_role(&self, role: Role, permission_ids: Vec<PermissionId>) -> Result<RoleGrants, StoreError>;

    /// Apply `changes` to a live role; the edge set is replaced as a whole when
    /// `changes.permission_ids` is present.
    async fn update_role(&self, id: RoleId, changes: RoleChanges) -> Result<RoleGrants, StoreError>;

    /// Soft-delete a role after checking it is custom and unassigned.
    async fn delete_role(&self, id: RoleId, deleted_at: DateTime<Utc>) -> Result<Role, StoreError>;

    async fn set_permission_active(&self, code: &PermissionCode, is_active: bool) -> Result<Permission, StoreError>;

    /// Insert missing permissions and roles; existing rows are left untouched.
    async fn seed(&self, permissions: Vec<Permission>, roles: Vec<RoleSeed>) -> Result<SeedReport, StoreError>;
}

/// Principal records as seen by the authorization engine.
#[async_trait::async_trait]
pub trait UserDirectory: Send + Sync {
    async fn principal(&self, id: UserId) -> Result<Option<Principal>, StoreError>;

    async fn insert_principal(&self, principal: Principal) -> Result<(), StoreError>;

    /// Fails with `NotFound` for unknown or deleted principals.
    async fn set_active(&self, id: UserId, is_active: bool) -> Result<Principal, StoreError>;

    /// Fails with `Conflict` when the principal is already deleted.
    async fn soft_delete(&self, id: UserId) -> Result<Principal, StoreError>;

    /// The target role must exist and be active.
    async fn assign_role(&self, id: UserId, role: &RoleCode) -> Result<Principal, StoreError>;

    /// Active, non-deleted principals holding `role`.
    async fn count_active_by_role(&self, role: &RoleCode) -> Result<u64, StoreError>;
}

#[async_trait::async_trait]
impl<S> RbacStore for Arc<S>
where
    S: RbacStore + ?Sized,
{
    async fn snapshot_for_role(&self, role: &RoleCode) -> Result<PolicySnapshot, StoreError> {
        (**self).snapshot_for_role(role).await
    }

    async fn permission_by_code(&self, code: &PermissionCode) -> Result<Option<Permission>, StoreError> {
        (**self).permission_by_code(code).await
    }

    async fn role_by_code(&self, code: &RoleCode) -> Result<Option<RoleGrants>, StoreError> {
        (**self).role_by_code(code).await
    }

    async fn role_by_id(&self, id: RoleId) -> Result<Option<RoleGrants>, StoreError> {
        (**self).role_by_id(id).await
    }

    async fn list_permissions(&self, filter: PermissionFilter) -> Result<Vec<Permission>, StoreError> {
        (**self).list_permissions(filter).await
    }

    async fn list_roles(&self, filter: RoleFilter) -> Result<Vec<RoleGrants>, StoreError> {
        (**self).list_roles(filter).await
    }

    async fn insert_role(&self, role: Role, permission_ids: Vec<PermissionId>) -> Result<RoleGrants, StoreError> {
        (**self).insert_role(role, permission_ids).await
    }

    async fn update_role(&self, id: RoleId, changes: RoleChanges) -> Result<RoleGrants, StoreError> {
        (**self).update_role(id, changes).await
    }

    async fn delete_role(&self, id: RoleId, deleted_at: DateTime<Utc>) -> Result<Role, StoreError> {
        (**self).delete_role(id, deleted_at).await
    }

    async fn set_permission_active(&self, code: &PermissionCode, is_active: bool) -> Result<Permission, StoreError> {
        (**self).set_permission_active(code, is_active).await
    }

    async fn seed(&self, permissions: Vec<Permission>, roles: Vec<RoleSeed>) -> Result<SeedReport, StoreError> {
        (**self).seed(permissions, roles).await
    }
}

#[async_trait::async_trait]
impl<S> UserDirectory for Arc<S>
where
    S: UserDirectory + ?Sized,
{
    async fn principal(&self, id: UserId) -> Result<Option<Principal>, StoreError> {
        (**self).principal(id).await
    }

    async fn insert_principal(&self, principal: Principal) -> Result<(), StoreError> {
        (**self).insert_principal(principal).await
    }

    async fn set_active(&self, id: UserId, is_active: bool) -> Result<Principal, StoreError> {
        (**self).set_active(id, is_active).await
    }

    async fn soft_delete(&self, id: UserId) -> Result<Principal, StoreError> {
        (**self).soft_delete(id).await
    }

    async fn assign_role(&self, id: UserId, role: &RoleCode) -> Result<Principal, StoreError> {
        (**self).assign_role(id, role).await
    }

    async fn count_active_by_role(&self, role: &RoleCode) -> Result<u64, StoreError> {
        (**self).count_active_by_role(role).await
    }
}
