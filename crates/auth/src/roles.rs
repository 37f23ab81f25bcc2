use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use guardian_core::RoleId;

/// Role code used for RBAC (e.g. "OPERATIONS").
///
/// Codes are normalised to upper case on construction so that uniqueness and
/// lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleCode(String);

impl RoleCode {
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The built-in role this code names, if any.
    pub fn system_role(&self) -> Option<SystemRole> {
        SystemRole::from_code(&self.0)
    }
}

impl core::fmt::Display for RoleCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoleCode {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<SystemRole> for RoleCode {
    fn from(value: SystemRole) -> Self {
        Self(value.code().to_string())
    }
}

/// The fixed set of built-in roles. Never removed, never renamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemRole {
    Admin,
    Operations,
    Cxo,
}

impl SystemRole {
    pub const ALL: [SystemRole; 3] = [SystemRole::Admin, SystemRole::Operations, SystemRole::Cxo];

    pub fn code(&self) -> &'static str {
        match self {
            SystemRole::Admin => "ADMIN",
            SystemRole::Operations => "OPERATIONS",
            SystemRole::Cxo => "CXO",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "ADMIN" => Some(SystemRole::Admin),
            "OPERATIONS" => Some(SystemRole::Operations),
            "CXO" => Some(SystemRole::Cxo),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SystemRole::Admin => "Administrator",
            SystemRole::Operations => "Operations User",
            SystemRole::Cxo => "Chief Executive Officer",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            SystemRole::Admin => "Full system access with all permissions",
            SystemRole::Operations => "Reconciliation and data management access",
            SystemRole::Cxo => "Executive dashboard and reporting access",
        }
    }
}

/// Whether a role is built-in or administrator-defined.
///
/// The admin bypass matches on `System(Admin)` rather than on a code string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "system_role", rename_all = "snake_case")]
pub enum RoleKind {
    System(SystemRole),
    Custom,
}

impl RoleKind {
    /// Kind implied by a code: built-in codes are system roles, everything
    /// else is custom.
    pub fn for_code(code: &RoleCode) -> Self {
        match code.system_role() {
            Some(system) => RoleKind::System(system),
            None => RoleKind::Custom,
        }
    }
}

/// A named grouping of permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub code: RoleCode,
    pub name: String,
    pub description: Option<String>,
    pub kind: RoleKind,
    pub is_active: bool,
    /// Set when the role has been soft-deleted. Its code stays reserved.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Role {
    pub fn is_system_role(&self) -> bool {
        matches!(self.kind, RoleKind::System(_))
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.kind, RoleKind::System(SystemRole::Admin))
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether the role takes part in resolution at all.
    pub fn is_resolvable(&self) -> bool {
        self.is_active && !self.is_deleted()
    }
}
