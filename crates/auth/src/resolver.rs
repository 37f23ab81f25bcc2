//! Role-permission resolution.
//!
//! - No IO
//! - No panics
//! - Deterministic for a given `(principal, code, snapshot)`

use serde::Serialize;

use crate::{GrantedPermission, PermissionCode, PolicySnapshot, Principal};

/// Why a capability was granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowReason {
    /// ADMIN holds every active permission without consulting edges.
    AdminBypass,
    /// The role's edge set contains the permission.
    Granted,
}

/// Why a capability was refused. Audit detail only; callers see
/// `AuthorizationDenied`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    PrincipalInactive,
    RoleInactive,
    PermissionInactive,
    PermissionNotGranted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
pub enum Decision {
    Allow(AllowReason),
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow(_))
    }

    pub fn reason_code(&self) -> &'static str {
        match self {
            Decision::Allow(AllowReason::AdminBypass) => "admin_bypass",
            Decision::Allow(AllowReason::Granted) => "granted",
            Decision::Deny(DenyReason::PrincipalInactive) => "principal_inactive",
            Decision::Deny(DenyReason::RoleInactive) => "role_inactive",
            Decision::Deny(DenyReason::PermissionInactive) => "permission_inactive",
            Decision::Deny(DenyReason::PermissionNotGranted) => "permission_not_granted",
        }
    }
}

/// Decide whether `principal` may exercise `code` under `snapshot`.
///
/// Resolution order:
/// 1. disabled principal → `PrincipalInactive`
/// 2. active ADMIN role → `AdminBypass` if the code is an active catalog
///    entry, otherwise `PermissionInactive` (deactivated codes are denied
///    to ADMIN as well)
/// 3. missing, mismatched, inactive or deleted role → `RoleInactive`
/// 4. unknown or inactive code → `PermissionInactive`
/// 5. edge membership → `Granted` / `PermissionNotGranted`
pub fn resolve(principal: &Principal, code: &PermissionCode, snapshot: &PolicySnapshot) -> Decision {
    if !principal.is_enabled() {
        return Decision::Deny(DenyReason::PrincipalInactive);
    }

    let role = snapshot
        .role
        .as_ref()
        .filter(|grants| grants.role.code == principal.role && grants.role.is_resolvable());

    let Some(grants) = role else {
        return Decision::Deny(DenyReason::RoleInactive);
    };

    let Some(permission) = snapshot.active_permission(code) else {
        return Decision::Deny(DenyReason::PermissionInactive);
    };

    if grants.role.is_admin() {
        return Decision::Allow(AllowReason::AdminBypass);
    }

    if grants.grants(permission) {
        Decision::Allow(AllowReason::Granted)
    } else {
        Decision::Deny(DenyReason::PermissionNotGranted)
    }
}

/// Every capability `principal` currently holds, ordered by category then
/// code for stable presentation.
pub fn granted_permissions(principal: &Principal, snapshot: &PolicySnapshot) -> Vec<GrantedPermission> {
    let mut granted: Vec<GrantedPermission> = snapshot
        .active_permissions()
        .filter(|p| resolve(principal, &p.code, snapshot).is_allowed())
        .map(GrantedPermission::from)
        .collect();

    granted.sort_by(|a, b| a.category.cmp(&b.category).then_with(|| a.code.cmp(&b.code)));
    granted
}
