//! Self-modification guard.
//!
//! Precondition checks independent of the permission graph: they apply to
//! every principal, ADMIN included. Pure functions, no retries; a caller that
//! fixes the precondition and retries succeeds.

use guardian_core::UserId;

use crate::catalog::codes;
use crate::{PermissionCode, Principal, RbacError, Role};

/// Capabilities that gate role and permission administration. Deactivating
/// one would deny it to ADMIN too, with no way back.
pub const ADMINISTRATION_CODES: [&str; 2] = [codes::SYSTEM_ROLES_MANAGE, codes::SYSTEM_SETTINGS_UPDATE];

/// Reject a status update that deactivates the actor's own account.
pub fn check_status_change(actor: &Principal, target: UserId, is_active: bool) -> Result<(), RbacError> {
    if actor.user_id == target && !is_active {
        return Err(RbacError::invalid_operation("cannot deactivate your own account"));
    }
    Ok(())
}

/// Reject a soft delete of the actor's own account.
pub fn check_user_delete(actor: &Principal, target: UserId) -> Result<(), RbacError> {
    if actor.user_id == target {
        return Err(RbacError::invalid_operation("cannot delete your own account"));
    }
    Ok(())
}

/// Reject deletion of system roles and of roles still assigned to active
/// principals.
pub fn check_role_delete(role: &Role, active_assignees: u64) -> Result<(), RbacError> {
    if role.is_system_role() {
        return Err(RbacError::invalid_operation(format!(
            "system role '{}' cannot be deleted",
            role.code
        )));
    }
    if active_assignees > 0 {
        return Err(RbacError::role_in_use(role.code.as_str(), active_assignees));
    }
    Ok(())
}

/// Reject a code change on a system role.
pub fn check_role_code_change(role: &Role, new_code: &crate::RoleCode) -> Result<(), RbacError> {
    if role.is_system_role() && &role.code != new_code {
        return Err(RbacError::invalid_operation(format!(
            "system role '{}' cannot change its code",
            role.code
        )));
    }
    Ok(())
}

/// Reject deactivating a permission that gates administration.
pub fn check_permission_toggle(code: &PermissionCode, is_active: bool) -> Result<(), RbacError> {
    if !is_active && ADMINISTRATION_CODES.contains(&code.as_str()) {
        return Err(RbacError::invalid_operation(format!(
            "permission '{code}' gates administration and cannot be deactivated"
        )));
    }
    Ok(())
}

/// Reject deactivating the ADMIN system role.
pub fn check_role_status_change(role: &Role, is_active: bool) -> Result<(), RbacError> {
    if role.is_admin() && !is_active {
        return Err(RbacError::invalid_operation(format!(
            "system role '{}' cannot be deactivated",
            role.code
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use guardian_core::RoleId;

    use super::*;
    use crate::{RoleCode, RoleKind, SystemRole};

    fn role(code: &str) -> Role {
        let code = RoleCode::new(code);
        Role {
            id: RoleId::new(),
            kind: RoleKind::for_code(&code),
            name: code.to_string(),
            code,
            description: None,
            is_active: true,
            deleted_at: None,
        }
    }

    #[test]
    fn self_deactivation_rejected_even_for_admin() {
        let admin = Principal::new(UserId::new(), SystemRole::Admin);
        let err = check_status_change(&admin, admin.user_id, false).unwrap_err();
        assert!(matches!(err, RbacError::InvalidOperation(_)));
    }

    #[test]
    fn self_activation_and_other_deactivation_allowed() {
        let cxo = Principal::new(UserId::new(), SystemRole::Cxo);
        assert!(check_status_change(&cxo, cxo.user_id, true).is_ok());
        assert!(check_status_change(&cxo, UserId::new(), false).is_ok());
    }

    #[test]
    fn self_deletion_rejected() {
        let admin = Principal::new(UserId::new(), SystemRole::Admin);
        assert!(matches!(
            check_user_delete(&admin, admin.user_id),
            Err(RbacError::InvalidOperation(_))
        ));
        assert!(check_user_delete(&admin, UserId::new()).is_ok());
    }

    #[test]
    fn system_role_deletion_rejected_before_count() {
        let err = check_role_delete(&role("ADMIN"), 5).unwrap_err();
        assert!(matches!(err, RbacError::InvalidOperation(_)));
    }

    #[test]
    fn assigned_custom_role_deletion_conflicts_until_empty() {
        let manager = role("MANAGER");
        assert!(matches!(
            check_role_delete(&manager, 3),
            Err(RbacError::Conflict { count: Some(3), .. })
        ));
        assert!(check_role_delete(&manager, 0).is_ok());
    }

    #[test]
    fn system_role_code_is_frozen() {
        let ops = role("OPERATIONS");
        assert!(check_role_code_change(&ops, &RoleCode::new("operations")).is_ok());
        assert!(check_role_code_change(&ops, &RoleCode::new("OPS")).is_err());
        assert!(check_role_code_change(&role("MANAGER"), &RoleCode::new("LEAD")).is_ok());
    }

    #[test]
    fn administration_permissions_cannot_be_deactivated() {
        for code in ADMINISTRATION_CODES {
            let code = PermissionCode::new(code);
            assert!(matches!(
                check_permission_toggle(&code, false),
                Err(RbacError::InvalidOperation(_))
            ));
            assert!(check_permission_toggle(&code, true).is_ok());
        }
        assert!(check_permission_toggle(&PermissionCode::new(codes::REPORTS_EXPORT), false).is_ok());
    }

    #[test]
    fn admin_role_stays_active() {
        assert!(matches!(
            check_role_status_change(&role("ADMIN"), false),
            Err(RbacError::InvalidOperation(_))
        ));
        assert!(check_role_status_change(&role("ADMIN"), true).is_ok());
        assert!(check_role_status_change(&role("OPERATIONS"), false).is_ok());
    }
}
