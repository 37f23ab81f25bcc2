//! Role registry contract: mutation inputs, their validation and listing
//! filters. Storage adapters apply the validated result atomically.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use guardian_core::{PermissionId, RoleId};

use crate::guard::{check_role_code_change, check_role_status_change};
use crate::{Permission, PermissionCategory, RbacError, Role, RoleCode, RoleGrants, RoleKind};

const MAX_NAME_LEN: usize = 100;
const MAX_CODE_LEN: usize = 50;
const MAX_DESCRIPTION_LEN: usize = 255;

/// Input for creating a custom role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRole {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub permission_ids: Vec<PermissionId>,
}

/// Partial update of a role. `None` leaves the attribute untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleChanges {
    pub code: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
    /// Replaces the whole edge set when present.
    pub permission_ids: Option<Vec<PermissionId>>,
}

impl NewRole {
    /// Validate the attributes and build an active custom role.
    ///
    /// Built-in codes are reserved; the permission ids are checked by the
    /// store against its catalog.
    pub fn into_role(self) -> Result<(Role, Vec<PermissionId>), RbacError> {
        let code = validate_code(&self.code)?;
        if code.system_role().is_some() {
            return Err(RbacError::duplicate(
                "code",
                format!("role code '{code}' is reserved for a system role"),
            ));
        }
        let role = Role {
            id: RoleId::new(),
            name: validate_name(&self.name)?,
            description: validate_description(self.description.as_deref())?,
            code,
            kind: RoleKind::Custom,
            is_active: true,
            deleted_at: None,
        };
        Ok((role, self.permission_ids))
    }
}

impl RoleChanges {
    pub fn permissions(permission_ids: Vec<PermissionId>) -> Self {
        Self {
            permission_ids: Some(permission_ids),
            ..Self::default()
        }
    }

    /// Apply the attribute changes to `role`, leaving the edge set to the
    /// caller. A system role keeps its code and ADMIN stays active.
    pub fn apply_to(&self, role: &Role) -> Result<Role, RbacError> {
        let mut updated = role.clone();
        if let Some(code) = &self.code {
            let code = validate_code(code)?;
            check_role_code_change(role, &code)?;
            if !role.is_system_role() && code.system_role().is_some() {
                return Err(RbacError::duplicate(
                    "code",
                    format!("role code '{code}' is reserved for a system role"),
                ));
            }
            updated.code = code;
        }
        if let Some(name) = &self.name {
            updated.name = validate_name(name)?;
        }
        if let Some(description) = &self.description {
            updated.description = validate_description(Some(description.as_str()))?;
        }
        if let Some(is_active) = self.is_active {
            check_role_status_change(role, is_active)?;
            updated.is_active = is_active;
        }
        Ok(updated)
    }

    /// Whether the code differs from the role's current one.
    pub fn changes_code(&self, role: &Role) -> bool {
        self.code
            .as_deref()
            .is_some_and(|code| RoleCode::new(code) != role.code)
    }
}

/// A role with its effective permissions, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleWithPermissions {
    pub role: Role,
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionFilter {
    pub category: Option<PermissionCategory>,
    pub is_active: Option<bool>,
}

impl PermissionFilter {
    pub fn matches(&self, permission: &Permission) -> bool {
        self.category.is_none_or(|c| c == permission.category)
            && self.is_active.is_none_or(|a| a == permission.is_active)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleFilter {
    pub is_active: Option<bool>,
    pub include_system: bool,
    pub include_deleted: bool,
}

impl Default for RoleFilter {
    fn default() -> Self {
        Self {
            is_active: None,
            include_system: true,
            include_deleted: false,
        }
    }
}

impl RoleFilter {
    pub fn matches(&self, role: &Role) -> bool {
        self.is_active.is_none_or(|a| a == role.is_active)
            && (self.include_system || !role.is_system_role())
            && (self.include_deleted || !role.is_deleted())
    }
}

/// Trim and check a role name.
pub fn validate_name(name: &str) -> Result<String, RbacError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RbacError::validation("name", "name cannot be empty"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(RbacError::validation(
            "name",
            format!("name exceeds {MAX_NAME_LEN} characters"),
        ));
    }
    Ok(name.to_string())
}

/// Normalise and check a role code (`[A-Z0-9_]`, upper-cased).
pub fn validate_code(code: &str) -> Result<RoleCode, RbacError> {
    let code = RoleCode::new(code);
    if code.is_empty() {
        return Err(RbacError::validation("code", "code cannot be empty"));
    }
    if code.as_str().len() > MAX_CODE_LEN {
        return Err(RbacError::validation(
            "code",
            format!("code exceeds {MAX_CODE_LEN} characters"),
        ));
    }
    if !code
        .as_str()
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(RbacError::validation(
            "code",
            "code may only contain letters, digits and underscores",
        ));
    }
    Ok(code)
}

pub fn validate_description(description: Option<&str>) -> Result<Option<String>, RbacError> {
    match description.map(str::trim) {
        None | Some("") => Ok(None),
        Some(d) if d.chars().count() > MAX_DESCRIPTION_LEN => Err(RbacError::validation(
            "description",
            format!("description exceeds {MAX_DESCRIPTION_LEN} characters"),
        )),
        Some(d) => Ok(Some(d.to_string())),
    }
}

/// Check a batch edge set against the catalog.
///
/// `is_active` answers `Some(active)` for known ids and `None` for unknown
/// ones. Either every id is known and active or the whole batch is rejected,
/// listing each offending id once.
pub fn validate_permission_batch<F>(ids: &[PermissionId], is_active: F) -> Result<BTreeSet<PermissionId>, RbacError>
where
    F: Fn(&PermissionId) -> Option<bool>,
{
    let requested: BTreeSet<PermissionId> = ids.iter().copied().collect();
    let offending: Vec<PermissionId> = requested
        .iter()
        .filter(|id| is_active(id) != Some(true))
        .copied()
        .collect();

    if offending.is_empty() {
        Ok(requested)
    } else {
        Err(RbacError::invalid_permissions(offending))
    }
}

/// Active permissions granted by a role; empty when the role itself is
/// inactive or deleted, regardless of edges. Ordered by category then code.
pub fn permissions_for_role<'a, I>(grants: &RoleGrants, catalog: I) -> Vec<Permission>
where
    I: IntoIterator<Item = &'a Permission>,
{
    if !grants.role.is_resolvable() {
        return Vec::new();
    }
    let mut permissions: Vec<Permission> = catalog
        .into_iter()
        .filter(|p| p.is_active && grants.grants(p))
        .cloned()
        .collect();
    permissions.sort_by(|a, b| a.category.cmp(&b.category).then_with(|| a.code.cmp(&b.code)));
    permissions
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::catalog::SYSTEM_PERMISSIONS;

    #[test]
    fn empty_name_is_rejected() {
        assert!(matches!(
            validate_name("   "),
            Err(RbacError::Validation { field: "name", .. })
        ));
        assert_eq!(validate_name(" Manager ").unwrap(), "Manager");
    }

    #[test]
    fn code_is_upper_cased_and_checked() {
        assert_eq!(validate_code("team_lead").unwrap().as_str(), "TEAM_LEAD");
        assert!(validate_code("team lead").is_err());
        assert!(validate_code("").is_err());
    }

    #[test]
    fn batch_rejects_inactive_and_unknown_atomically() {
        let active = PermissionId::new();
        let inactive = PermissionId::new();
        let unknown = PermissionId::new();
        let known: HashMap<PermissionId, bool> = [(active, true), (inactive, false)].into_iter().collect();

        let err = validate_permission_batch(&[active, inactive, unknown, inactive], |id| {
            known.get(id).copied()
        })
        .unwrap_err();

        let RbacError::Validation {
            invalid_permission_ids,
            ..
        } = err
        else {
            panic!("expected validation error");
        };
        let mut expected = vec![inactive, unknown];
        expected.sort();
        assert_eq!(invalid_permission_ids, expected);
    }

    #[test]
    fn batch_deduplicates_valid_ids() {
        let a = PermissionId::new();
        let set = validate_permission_batch(&[a, a], |_| Some(true)).unwrap();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn inactive_role_lists_no_permissions() {
        let catalog: Vec<Permission> = SYSTEM_PERMISSIONS.iter().map(|s| s.to_permission()).collect();
        let mut role = crate::catalog::system_role(crate::SystemRole::Cxo);
        role.is_active = false;
        let grants = RoleGrants {
            role,
            granted: catalog.iter().map(|p| p.id).collect(),
        };
        assert!(permissions_for_role(&grants, &catalog).is_empty());
    }

    #[test]
    fn new_role_cannot_take_a_system_code() {
        let err = NewRole {
            code: "cxo".into(),
            name: "Shadow".into(),
            description: None,
            permission_ids: vec![],
        }
        .into_role()
        .unwrap_err();
        assert!(matches!(err, RbacError::Conflict { field: Some("code"), .. }));
    }

    #[test]
    fn changes_keep_system_code_and_rename() {
        let cxo = crate::catalog::system_role(crate::SystemRole::Cxo);
        let rename = RoleChanges {
            name: Some("Chief".into()),
            ..RoleChanges::default()
        };
        assert_eq!(rename.apply_to(&cxo).unwrap().name, "Chief");

        let recode = RoleChanges {
            code: Some("BOSS".into()),
            ..RoleChanges::default()
        };
        assert!(matches!(
            recode.apply_to(&cxo),
            Err(RbacError::InvalidOperation(_))
        ));
    }

    #[test]
    fn admin_role_cannot_be_deactivated_by_update() {
        let admin = crate::catalog::system_role(crate::SystemRole::Admin);
        let off = RoleChanges {
            is_active: Some(false),
            ..RoleChanges::default()
        };
        assert!(matches!(off.apply_to(&admin), Err(RbacError::InvalidOperation(_))));

        let ops = crate::catalog::system_role(crate::SystemRole::Operations);
        assert!(!off.apply_to(&ops).unwrap().is_active);
    }

    #[test]
    fn role_filter_hides_deleted_and_system_on_request() {
        let cxo = crate::catalog::system_role(crate::SystemRole::Cxo);
        let filter = RoleFilter {
            include_system: false,
            ..RoleFilter::default()
        };
        assert!(!filter.matches(&cxo));
        assert!(RoleFilter::default().matches(&cxo));
    }
}
