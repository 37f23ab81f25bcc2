//! Built-in permission catalog and system role definitions (seed data).

use guardian_core::{PermissionId, RoleId};

use crate::{
    Permission, PermissionAction, PermissionCategory, PermissionCode, Role, RoleKind, SystemRole,
};

/// Static description of a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionSeed {
    pub code: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub category: PermissionCategory,
    pub action: PermissionAction,
    pub resource: &'static str,
}

impl PermissionSeed {
    /// Materialise with a fresh id, active.
    pub fn to_permission(&self) -> Permission {
        Permission {
            id: PermissionId::new(),
            code: PermissionCode::new(self.code),
            name: self.name.to_string(),
            description: Some(self.description.to_string()),
            category: self.category,
            action: self.action,
            resource: self.resource.to_string(),
            is_active: true,
        }
    }
}

pub mod codes {
    pub const RECONCILIATION_FILE_UPLOAD: &str = "reconciliation.file.upload";
    pub const RECONCILIATION_DATA_READ: &str = "reconciliation.data.read";
    pub const RECONCILIATION_DATA_UPDATE: &str = "reconciliation.data.update";
    pub const RECONCILIATION_FILE_DELETE: &str = "reconciliation.file.delete";
    pub const RECONCILIATION_SUMMARY_READ: &str = "reconciliation.summary.read";
    pub const RECONCILIATION_DATA_VALIDATE: &str = "reconciliation.data.validate";
    pub const RECONCILIATION_DATA_SUBMIT: &str = "reconciliation.data.submit";
    pub const RECONCILIATION_AI_ERROR_DETECTION: &str = "reconciliation.ai.error_detection";

    pub const DASHBOARD_EXECUTIVE_READ: &str = "dashboard.executive.read";
    pub const DASHBOARD_REVENUE_TRENDS_READ: &str = "dashboard.revenue_trends.read";
    pub const DASHBOARD_AI_INSIGHTS_READ: &str = "dashboard.ai_insights.read";
    pub const DASHBOARD_COLLECTION_PERFORMANCE_READ: &str = "dashboard.collection_performance.read";

    pub const REPORTS_EXPORT: &str = "reports.export";
    pub const REPORTS_FINE_ISSUE_READ: &str = "reports.fine_issue.read";
    pub const REPORTS_FINE_COLLECTION_READ: &str = "reports.fine_collection.read";

    pub const USERS_CREATE: &str = "users.create";
    pub const USERS_READ: &str = "users.read";
    pub const USERS_UPDATE: &str = "users.update";
    pub const USERS_DELETE: &str = "users.delete";

    pub const DEPARTMENTS_CREATE: &str = "departments.create";
    pub const DEPARTMENTS_READ: &str = "departments.read";
    pub const DEPARTMENTS_UPDATE: &str = "departments.update";
    pub const DEPARTMENTS_DELETE: &str = "departments.delete";

    pub const SYSTEM_AUDIT_LOGS_READ: &str = "system.audit_logs.read";
    pub const SYSTEM_SETTINGS_UPDATE: &str = "system.settings.update";
    pub const SYSTEM_ROLES_MANAGE: &str = "system.roles.manage";
}

use PermissionAction::{Create, Delete, Execute, Read, Update};
use PermissionCategory::{
    Dashboard, DepartmentManagement, Reconciliation, Reports, System, UserManagement,
};

macro_rules! seed {
    ($code:expr, $name:literal, $desc:literal, $cat:expr, $action:expr, $resource:literal) => {
        PermissionSeed {
            code: $code,
            name: $name,
            description: $desc,
            category: $cat,
            action: $action,
            resource: $resource,
        }
    };
}

pub const SYSTEM_PERMISSIONS: &[PermissionSeed] = &[
    seed!(codes::RECONCILIATION_FILE_UPLOAD, "Upload Files", "Upload fine data files (Excel, CSV, JSON)", Reconciliation, Execute, "fine_data_file"),
    seed!(codes::RECONCILIATION_DATA_READ, "View Data Grid", "View fine data grid and records", Reconciliation, Read, "fine_data"),
    seed!(codes::RECONCILIATION_DATA_UPDATE, "Edit Data Grid", "Edit fine data records in grid", Reconciliation, Update, "fine_data"),
    seed!(codes::RECONCILIATION_FILE_DELETE, "Delete Files", "Delete uploaded fine data files", Reconciliation, Delete, "fine_data_file"),
    seed!(codes::RECONCILIATION_SUMMARY_READ, "View Reconciliation Summary", "View reconciliation engine results and matching", Reconciliation, Read, "reconciliation_summary"),
    seed!(codes::RECONCILIATION_DATA_VALIDATE, "Validate Data", "Run data validation checks", Reconciliation, Execute, "fine_data"),
    seed!(codes::RECONCILIATION_DATA_SUBMIT, "Submit for Approval", "Submit reconciliation data for approval", Reconciliation, Execute, "reconciliation_summary"),
    seed!(codes::RECONCILIATION_AI_ERROR_DETECTION, "AI Error Detection", "Access AI-powered error detection features", Reconciliation, Read, "ai_error_detection"),
    seed!(codes::DASHBOARD_EXECUTIVE_READ, "View Executive Dashboard", "Access executive dashboard with KPIs", Dashboard, Read, "executive_dashboard"),
    seed!(codes::DASHBOARD_REVENUE_TRENDS_READ, "View Revenue Trends", "View revenue trend analysis and charts", Dashboard, Read, "revenue_trends"),
    seed!(codes::DASHBOARD_AI_INSIGHTS_READ, "View AI Insights", "Access AI-powered insights and recommendations", Dashboard, Read, "ai_insights"),
    seed!(codes::DASHBOARD_COLLECTION_PERFORMANCE_READ, "View Collection Performance", "View collection performance metrics by emirate/week", Dashboard, Read, "collection_performance"),
    seed!(codes::REPORTS_EXPORT, "Export Reports", "Export reports and data to various formats", Reports, Execute, "reports"),
    seed!(codes::REPORTS_FINE_ISSUE_READ, "View Fine Issue Report", "View fine issue report data", Reports, Read, "fine_issue_report"),
    seed!(codes::REPORTS_FINE_COLLECTION_READ, "View Fine Collection Report", "View fine collection report data", Reports, Read, "fine_collection_report"),
    seed!(codes::USERS_CREATE, "Create Users", "Create new user accounts", UserManagement, Create, "users"),
    seed!(codes::USERS_READ, "View Users", "View user accounts and details", UserManagement, Read, "users"),
    seed!(codes::USERS_UPDATE, "Update Users", "Update user account information", UserManagement, Update, "users"),
    seed!(codes::USERS_DELETE, "Delete Users", "Delete user accounts", UserManagement, Delete, "users"),
    seed!(codes::DEPARTMENTS_CREATE, "Create Departments", "Create new departments", DepartmentManagement, Create, "departments"),
    seed!(codes::DEPARTMENTS_READ, "View Departments", "View department information", DepartmentManagement, Read, "departments"),
    seed!(codes::DEPARTMENTS_UPDATE, "Update Departments", "Update department information", DepartmentManagement, Update, "departments"),
    seed!(codes::DEPARTMENTS_DELETE, "Delete Departments", "Delete departments", DepartmentManagement, Delete, "departments"),
    seed!(codes::SYSTEM_AUDIT_LOGS_READ, "View Audit Logs", "Access system audit logs", System, Read, "audit_logs"),
    seed!(codes::SYSTEM_SETTINGS_UPDATE, "Update System Settings", "Modify system configuration", System, Update, "system_settings"),
    seed!(codes::SYSTEM_ROLES_MANAGE, "Manage Roles", "Create, edit and delete roles and their permissions", System, Update, "roles"),
];

/// Default edge set for a built-in role.
///
/// ADMIN is seeded with the whole catalog for display purposes only; its
/// grants come from the bypass, not from these edges.
pub fn system_role_grants(role: SystemRole) -> Vec<&'static str> {
    match role {
        SystemRole::Admin => SYSTEM_PERMISSIONS.iter().map(|p| p.code).collect(),
        SystemRole::Cxo => vec![
            codes::DASHBOARD_EXECUTIVE_READ,
            codes::DASHBOARD_REVENUE_TRENDS_READ,
            codes::DASHBOARD_AI_INSIGHTS_READ,
            codes::DASHBOARD_COLLECTION_PERFORMANCE_READ,
            codes::REPORTS_EXPORT,
            codes::REPORTS_FINE_ISSUE_READ,
            codes::REPORTS_FINE_COLLECTION_READ,
            codes::RECONCILIATION_SUMMARY_READ,
        ],
        SystemRole::Operations => vec![
            codes::RECONCILIATION_FILE_UPLOAD,
            codes::RECONCILIATION_DATA_READ,
            codes::RECONCILIATION_DATA_UPDATE,
            codes::RECONCILIATION_FILE_DELETE,
            codes::RECONCILIATION_SUMMARY_READ,
            codes::RECONCILIATION_DATA_VALIDATE,
            codes::RECONCILIATION_DATA_SUBMIT,
            codes::RECONCILIATION_AI_ERROR_DETECTION,
            codes::REPORTS_FINE_ISSUE_READ,
            codes::REPORTS_FINE_COLLECTION_READ,
        ],
    }
}

/// Materialise a built-in role, active.
pub fn system_role(role: SystemRole) -> Role {
    Role {
        id: RoleId::new(),
        code: role.into(),
        name: role.display_name().to_string(),
        description: Some(role.description().to_string()),
        kind: RoleKind::System(role),
        is_active: true,
        deleted_at: None,
    }
}
