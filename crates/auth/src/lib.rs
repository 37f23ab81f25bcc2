//! `guardian-auth`: pure authorization boundary.
//!
//! Permission catalog, roles, resolution and the audit model. This crate is
//! intentionally decoupled from transport and storage: everything here works
//! on an explicit [`PolicySnapshot`].

pub mod audit;
pub mod authorize;
pub mod catalog;
pub mod error;
pub mod guard;
pub mod permissions;
pub mod principal;
pub mod registry;
pub mod resolver;
pub mod roles;
pub mod snapshot;

pub use audit::{
    AdminAction, AdminActionEvent, AuditEvent, AuditSink, AuditSinkError, AuditStatus,
    DecisionEvent, DecisionOutcome, ResourceType, record_best_effort,
};
pub use authorize::{CodeDecision, Evaluation, Requirement, RequiresCapability, authorize, evaluate};
pub use error::RbacError;
pub use permissions::{GrantedPermission, Permission, PermissionAction, PermissionCategory, PermissionCode};
pub use principal::Principal;
pub use registry::{NewRole, PermissionFilter, RoleChanges, RoleFilter, RoleWithPermissions};
pub use resolver::{AllowReason, Decision, DenyReason, granted_permissions, resolve};
pub use roles::{Role, RoleCode, RoleKind, SystemRole};
pub use snapshot::{PolicySnapshot, RoleGrants};
