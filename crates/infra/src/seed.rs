//! Idempotent catalog seeding: built-in permissions and system roles.

use tracing::info;

use guardian_auth::catalog::{SYSTEM_PERMISSIONS, system_role, system_role_grants};
use guardian_auth::{PermissionCode, SystemRole};

use crate::store::{RbacStore, RoleSeed, SeedReport, StoreError};

/// Insert whatever part of the built-in catalog is missing.
///
/// Existing rows are never touched, so a permission deactivated by an
/// administrator stays deactivated across restarts.
pub async fn seed_catalog<S>(store: &S) -> Result<SeedReport, StoreError>
where
    S: RbacStore + ?Sized,
{
    let permissions = SYSTEM_PERMISSIONS.iter().map(|s| s.to_permission()).collect();
    let roles = SystemRole::ALL
        .into_iter()
        .map(|role| RoleSeed {
            role: system_role(role),
            grants: system_role_grants(role).into_iter().map(PermissionCode::new).collect(),
        })
        .collect();

    let report = store.seed(permissions, roles).await?;
    info!(
        permissions_inserted = report.permissions_inserted,
        roles_inserted = report.roles_inserted,
        "permission catalog seeded"
    );
    Ok(report)
}
