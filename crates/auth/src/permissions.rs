use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use guardian_core::PermissionId;

/// Capability code (e.g. "reconciliation.file.upload").
///
/// Codes are opaque dotted strings at this layer. The first segment is the
/// conventional category prefix, the last one the action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionCode(Cow<'static, str>);

impl PermissionCode {
    pub fn new(code: impl Into<Cow<'static, str>>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for PermissionCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for PermissionCode {
    fn from(value: &'static str) -> Self {
        Self::new(value)
    }
}

/// Grouping used to organise the catalog for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionCategory {
    Dashboard,
    DepartmentManagement,
    Reconciliation,
    Reports,
    System,
    UserManagement,
}

impl PermissionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionCategory::Dashboard => "dashboard",
            PermissionCategory::DepartmentManagement => "department_management",
            PermissionCategory::Reconciliation => "reconciliation",
            PermissionCategory::Reports => "reports",
            PermissionCategory::System => "system",
            PermissionCategory::UserManagement => "user_management",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "dashboard" => Some(PermissionCategory::Dashboard),
            "department_management" => Some(PermissionCategory::DepartmentManagement),
            "reconciliation" => Some(PermissionCategory::Reconciliation),
            "reports" => Some(PermissionCategory::Reports),
            "system" => Some(PermissionCategory::System),
            "user_management" => Some(PermissionCategory::UserManagement),
            _ => None,
        }
    }
}

impl core::fmt::Display for PermissionCategory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verb a permission grants over its resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionAction {
    Create,
    Read,
    Update,
    Delete,
    /// Special actions such as file upload or validation runs.
    Execute,
}

impl PermissionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionAction::Create => "create",
            PermissionAction::Read => "read",
            PermissionAction::Update => "update",
            PermissionAction::Delete => "delete",
            PermissionAction::Execute => "execute",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(PermissionAction::Create),
            "read" => Some(PermissionAction::Read),
            "update" => Some(PermissionAction::Update),
            "delete" => Some(PermissionAction::Delete),
            "execute" => Some(PermissionAction::Execute),
            _ => None,
        }
    }
}

/// A catalog entry.
///
/// Permissions are created by seeding and afterwards only toggled
/// active/inactive; they are never hard-deleted so that audit history keeps
/// resolving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub code: PermissionCode,
    pub name: String,
    pub description: Option<String>,
    pub category: PermissionCategory,
    pub action: PermissionAction,
    pub resource: String,
    pub is_active: bool,
}

/// A permission as handed to a client: its code plus presentation metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrantedPermission {
    pub code: PermissionCode,
    pub name: String,
    pub category: PermissionCategory,
}

impl From<&Permission> for GrantedPermission {
    fn from(p: &Permission) -> Self {
        Self {
            code: p.code.clone(),
            name: p.name.clone(),
            category: p.category,
        }
    }
}
