//! Role and permission administration behind the enforcer.
//!
//! Each mutation is a command that declares its requirement; the command is
//! authorized, applied atomically by the store and recorded as an
//! administrative audit event (success or failure).

use chrono::Utc;
use tracing::info;

use guardian_auth::catalog::codes;
use guardian_auth::registry::permissions_for_role;
use guardian_auth::{
    AdminAction, AdminActionEvent, AuditEvent, AuditSink, AuditStatus, NewRole, Permission,
    PermissionCode, PermissionFilter, Principal, RbacError, Requirement, RequiresCapability, Role,
    RoleChanges, RoleCode, RoleFilter, RoleGrants, RoleWithPermissions, ResourceType,
};
use guardian_core::{AuditEventId, PermissionId, RoleId};

use crate::enforcer::Enforcer;
use crate::store::RbacStore;

#[derive(Debug, Clone)]
pub struct CreateRole(pub NewRole);

#[derive(Debug, Clone)]
pub struct UpdateRole {
    pub role_id: RoleId,
    pub changes: RoleChanges,
}

#[derive(Debug, Clone)]
pub struct SetRolePermissions {
    pub role_id: RoleId,
    pub permission_ids: Vec<PermissionId>,
}

#[derive(Debug, Clone, Copy)]
pub struct DeleteRole {
    pub role_id: RoleId,
}

#[derive(Debug, Clone)]
pub struct SetPermissionActive {
    pub code: PermissionCode,
    pub is_active: bool,
}

impl RequiresCapability for CreateRole {
    fn requirement(&self) -> Requirement {
        Requirement::single(codes::SYSTEM_ROLES_MANAGE)
    }
}

impl RequiresCapability for UpdateRole {
    fn requirement(&self) -> Requirement {
        Requirement::single(codes::SYSTEM_ROLES_MANAGE)
    }
}

impl RequiresCapability for SetRolePermissions {
    fn requirement(&self) -> Requirement {
        Requirement::single(codes::SYSTEM_ROLES_MANAGE)
    }
}

impl RequiresCapability for DeleteRole {
    fn requirement(&self) -> Requirement {
        Requirement::single(codes::SYSTEM_ROLES_MANAGE)
    }
}

impl RequiresCapability for SetPermissionActive {
    fn requirement(&self) -> Requirement {
        Requirement::all_of([codes::SYSTEM_ROLES_MANAGE, codes::SYSTEM_SETTINGS_UPDATE])
    }
}

/// Reading the registry: role managers and user administrators.
fn read_registry() -> Requirement {
    Requirement::any_of([codes::SYSTEM_ROLES_MANAGE, codes::USERS_READ])
}

pub struct RoleAdmin<S, A> {
    enforcer: Enforcer<S, A>,
}

impl<S, A> RoleAdmin<S, A>
where
    S: RbacStore,
    A: AuditSink,
{
    pub fn new(enforcer: Enforcer<S, A>) -> Self {
        Self { enforcer }
    }

    pub fn enforcer(&self) -> &Enforcer<S, A> {
        &self.enforcer
    }

    pub async fn create_role(&self, actor: &Principal, command: CreateRole) -> Result<RoleWithPermissions, RbacError> {
        self.enforcer.authorize_operation(actor, &command).await?;
        let code = RoleCode::new(&command.0.code);

        let outcome = async {
            let (role, permission_ids) = command.0.into_role()?;
            let grants = self.store().insert_role(role, permission_ids).await?;
            self.describe(grants).await
        }
        .await;

        self.record(actor, AdminAction::RoleCreate, ResourceType::Role, code.to_string(), &outcome, |r| {
            format!("created role '{}' with {} permission(s)", r.role.code, r.permissions.len())
        });
        outcome
    }

    pub async fn update_role(&self, actor: &Principal, command: UpdateRole) -> Result<RoleWithPermissions, RbacError> {
        self.enforcer.authorize_operation(actor, &command).await?;
        let action = if command.changes.permission_ids.is_some() {
            AdminAction::PermissionChange
        } else {
            AdminAction::RoleUpdate
        };

        let outcome = async {
            let grants = self.store().update_role(command.role_id, command.changes).await?;
            self.describe(grants).await
        }
        .await;

        self.record(actor, action, ResourceType::Role, command.role_id.to_string(), &outcome, |r| {
            format!("updated role '{}'", r.role.code)
        });
        outcome
    }

    /// Replace a role's whole edge set. Unknown or inactive ids reject the
    /// batch and leave the previous set in place.
    pub async fn set_role_permissions(&self, actor: &Principal, command: SetRolePermissions) -> Result<RoleWithPermissions, RbacError> {
        self.enforcer.authorize_operation(actor, &command).await?;

        let outcome = async {
            let changes = RoleChanges::permissions(command.permission_ids);
            let grants = self.store().update_role(command.role_id, changes).await?;
            self.describe(grants).await
        }
        .await;

        self.record(
            actor,
            AdminAction::PermissionChange,
            ResourceType::Role,
            command.role_id.to_string(),
            &outcome,
            |r| format!("role '{}' now grants {} permission(s)", r.role.code, r.permissions.len()),
        );
        outcome
    }

    /// Soft-delete a custom role with no active assignees.
    pub async fn delete_role(&self, actor: &Principal, command: DeleteRole) -> Result<Role, RbacError> {
        self.enforcer.authorize_operation(actor, &command).await?;

        let outcome = self
            .store()
            .delete_role(command.role_id, Utc::now())
            .await
            .map_err(RbacError::from);

        self.record(actor, AdminAction::RoleDelete, ResourceType::Role, command.role_id.to_string(), &outcome, |r| {
            format!("deleted role '{}'", r.code)
        });
        outcome
    }

    /// Toggle a catalog entry; the only mutation a permission supports.
    pub async fn set_permission_active(&self, actor: &Principal, command: SetPermissionActive) -> Result<Permission, RbacError> {
        self.enforcer.authorize_operation(actor, &command).await?;

        let outcome = self
            .store()
            .set_permission_active(&command.code, command.is_active)
            .await
            .map_err(RbacError::from);

        self.record(
            actor,
            AdminAction::PermissionChange,
            ResourceType::Permission,
            command.code.to_string(),
            &outcome,
            |p| {
                let state = if p.is_active { "activated" } else { "deactivated" };
                format!("{state} permission '{}'", p.code)
            },
        );
        outcome
    }

    pub async fn get_role(&self, actor: &Principal, role_id: RoleId) -> Result<RoleWithPermissions, RbacError> {
        self.enforcer
            .enforce(actor, &read_registry(), move || async move {
                let grants = self
                    .store()
                    .role_by_id(role_id)
                    .await?
                    .filter(|g| !g.role.is_deleted())
                    .ok_or_else(|| RbacError::not_found("role", role_id))?;
                self.describe(grants).await
            })
            .await
    }

    /// Lookup by code; soft-deleted roles are not found.
    pub async fn lookup_role(&self, actor: &Principal, code: &RoleCode) -> Result<RoleWithPermissions, RbacError> {
        self.enforcer
            .enforce(actor, &read_registry(), move || async move {
                let grants = self
                    .store()
                    .role_by_code(code)
                    .await?
                    .filter(|g| !g.role.is_deleted())
                    .ok_or_else(|| RbacError::not_found("role", code))?;
                self.describe(grants).await
            })
            .await
    }

    pub async fn lookup_permission(&self, actor: &Principal, code: &PermissionCode) -> Result<Permission, RbacError> {
        self.enforcer
            .enforce(actor, &read_registry(), move || async move {
                self.store()
                    .permission_by_code(code)
                    .await?
                    .ok_or_else(|| RbacError::not_found("permission", code))
            })
            .await
    }

    /// Active permissions a role grants; empty for an inactive role.
    pub async fn list_permissions_for_role(&self, actor: &Principal, role_id: RoleId) -> Result<Vec<Permission>, RbacError> {
        Ok(self.get_role(actor, role_id).await?.permissions)
    }

    pub async fn list_roles(&self, actor: &Principal, filter: RoleFilter) -> Result<Vec<RoleWithPermissions>, RbacError> {
        self.enforcer
            .enforce(actor, &read_registry(), move || async move {
                let catalog = self.store().list_permissions(PermissionFilter::default()).await?;
                let roles = self.store().list_roles(filter).await?;
                Ok::<_, RbacError>(roles
                    .into_iter()
                    .map(|grants| RoleWithPermissions {
                        permissions: permissions_for_role(&grants, &catalog),
                        role: grants.role,
                    })
                    .collect())
            })
            .await
    }

    pub async fn list_permissions(&self, actor: &Principal, filter: PermissionFilter) -> Result<Vec<Permission>, RbacError> {
        self.enforcer
            .enforce(actor, &read_registry(), move || async move {
                self.store().list_permissions(filter).await.map_err(RbacError::from)
            })
            .await
    }

    fn store(&self) -> &S {
        self.enforcer.store()
    }

    async fn describe(&self, grants: RoleGrants) -> Result<RoleWithPermissions, RbacError> {
        let catalog = self.store().list_permissions(PermissionFilter::default()).await?;
        Ok(RoleWithPermissions {
            permissions: permissions_for_role(&grants, &catalog),
            role: grants.role,
        })
    }

    fn record<T>(
        &self,
        actor: &Principal,
        action: AdminAction,
        resource_type: ResourceType,
        resource_id: String,
        outcome: &Result<T, RbacError>,
        describe: impl FnOnce(&T) -> String,
    ) {
        let (status, description, error_kind) = match outcome {
            Ok(value) => (AuditStatus::Success, describe(value), None),
            Err(err) => (AuditStatus::Failure, err.to_string(), Some(err.kind())),
        };
        info!(
            actor_id = %actor.user_id,
            action = action.as_str(),
            resource_id = %resource_id,
            status = status.as_str(),
            "{description}"
        );
        self.enforcer.emit(AuditEvent::AdminAction(AdminActionEvent {
            event_id: AuditEventId::new(),
            actor_id: actor.user_id,
            action,
            resource_type,
            resource_id,
            status,
            description,
            error_kind,
            timestamp: Utc::now(),
        }));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use guardian_auth::SystemRole;
    use guardian_core::UserId;

    use super::*;
    use crate::audit::InMemoryAuditSink;
    use crate::seed::seed_catalog;
    use crate::store::{InMemoryRbacStore, UserDirectory};

    struct Fixture {
        admin: RoleAdmin<Arc<InMemoryRbacStore>, Arc<InMemoryAuditSink>>,
        store: Arc<InMemoryRbacStore>,
        audit: Arc<InMemoryAuditSink>,
        root: Principal,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryRbacStore::new());
        seed_catalog(&*store).await.unwrap();
        let audit = InMemoryAuditSink::new();
        let root = Principal::new(UserId::new(), SystemRole::Admin);
        store.insert_principal(root.clone()).await.unwrap();
        Fixture {
            admin: RoleAdmin::new(Enforcer::new(store.clone(), audit.clone())),
            store,
            audit,
            root,
        }
    }

    async fn id_of(store: &InMemoryRbacStore, code: &'static str) -> PermissionId {
        store
            .permission_by_code(&PermissionCode::new(code))
            .await
            .unwrap()
            .unwrap()
            .id
    }

    fn new_role(code: &str, permission_ids: Vec<PermissionId>) -> CreateRole {
        CreateRole(NewRole {
            code: code.to_string(),
            name: "Manager".to_string(),
            description: Some("Team manager".to_string()),
            permission_ids,
        })
    }

    fn admin_events(audit: &InMemoryAuditSink) -> Vec<AdminActionEvent> {
        audit
            .events()
            .into_iter()
            .filter_map(|e| match e {
                AuditEvent::AdminAction(a) => Some(a),
                AuditEvent::Decision(_) => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn create_role_with_inactive_permission_is_rejected_whole() {
        let f = fixture().await;
        let a = id_of(&f.store, codes::REPORTS_EXPORT).await;
        let b = id_of(&f.store, codes::REPORTS_FINE_ISSUE_READ).await;
        f.store
            .set_permission_active(&PermissionCode::new(codes::REPORTS_FINE_ISSUE_READ), false)
            .await
            .unwrap();

        let err = f.admin.create_role(&f.root, new_role("MANAGER", vec![a, b])).await.unwrap_err();
        let RbacError::Validation {
            invalid_permission_ids,
            ..
        } = err
        else {
            panic!("expected validation error, got {err:?}");
        };
        assert_eq!(invalid_permission_ids, vec![b]);
        assert!(f.store.role_by_code(&RoleCode::new("MANAGER")).await.unwrap().is_none());

        let events = admin_events(&f.audit);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, AuditStatus::Failure);
        assert_eq!(events[0].error_kind, Some("validation_error"));
    }

    #[tokio::test]
    async fn create_role_returns_effective_permissions() {
        let f = fixture().await;
        let a = id_of(&f.store, codes::REPORTS_EXPORT).await;

        let created = f.admin.create_role(&f.root, new_role("manager", vec![a])).await.unwrap();
        assert_eq!(created.role.code.as_str(), "MANAGER");
        assert!(!created.role.is_system_role());
        assert_eq!(created.permissions.len(), 1);

        let err = f.admin.create_role(&f.root, new_role("Manager", vec![])).await.unwrap_err();
        assert!(matches!(err, RbacError::Conflict { field: Some("code"), .. }));
    }

    #[tokio::test]
    async fn empty_name_is_a_validation_error() {
        let f = fixture().await;
        let mut command = new_role("LEAD", vec![]);
        command.0.name = "  ".to_string();
        assert!(matches!(
            f.admin.create_role(&f.root, command).await,
            Err(RbacError::Validation { field: "name", .. })
        ));
    }

    #[tokio::test]
    async fn system_role_cannot_be_deleted() {
        let f = fixture().await;
        let admin_role = f.store.role_by_code(&RoleCode::new("ADMIN")).await.unwrap().unwrap();

        let err = f
            .admin
            .delete_role(&f.root, DeleteRole { role_id: admin_role.role.id })
            .await
            .unwrap_err();
        assert!(matches!(err, RbacError::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn deleting_an_assigned_role_conflicts_until_reassigned() {
        let f = fixture().await;
        let created = f.admin.create_role(&f.root, new_role("MANAGER", vec![])).await.unwrap();
        let role_id = created.role.id;

        let mut members = Vec::new();
        for _ in 0..3 {
            let user = Principal::new(UserId::new(), "MANAGER");
            f.store.insert_principal(user.clone()).await.unwrap();
            members.push(user.user_id);
        }

        let err = f.admin.delete_role(&f.root, DeleteRole { role_id }).await.unwrap_err();
        assert!(matches!(err, RbacError::Conflict { count: Some(3), .. }));

        for id in members {
            f.store.assign_role(id, &RoleCode::new("CXO")).await.unwrap();
        }
        let deleted = f.admin.delete_role(&f.root, DeleteRole { role_id }).await.unwrap();
        assert!(deleted.is_deleted());

        // Gone from lookups, code stays reserved.
        assert!(matches!(
            f.admin.get_role(&f.root, role_id).await,
            Err(RbacError::NotFound { .. })
        ));
        assert!(f.admin.create_role(&f.root, new_role("MANAGER", vec![])).await.is_err());
    }

    #[tokio::test]
    async fn system_role_code_is_frozen_but_edges_are_editable() {
        let f = fixture().await;
        let cxo = f.store.role_by_code(&RoleCode::new("CXO")).await.unwrap().unwrap();

        let err = f
            .admin
            .update_role(
                &f.root,
                UpdateRole {
                    role_id: cxo.role.id,
                    changes: RoleChanges {
                        code: Some("CEO".into()),
                        ..RoleChanges::default()
                    },
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RbacError::InvalidOperation(_)));

        let export = id_of(&f.store, codes::REPORTS_EXPORT).await;
        let updated = f
            .admin
            .set_role_permissions(
                &f.root,
                SetRolePermissions {
                    role_id: cxo.role.id,
                    permission_ids: vec![export],
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.permissions.len(), 1);
    }

    #[tokio::test]
    async fn non_admin_cannot_manage_roles() {
        let f = fixture().await;
        let cxo = Principal::new(UserId::new(), SystemRole::Cxo);

        let err = f.admin.create_role(&cxo, new_role("MANAGER", vec![])).await.unwrap_err();
        assert_eq!(
            err,
            RbacError::AuthorizationDenied {
                denied: vec![PermissionCode::new(codes::SYSTEM_ROLES_MANAGE)]
            }
        );
        // Only the decision event; nothing was attempted.
        assert!(admin_events(&f.audit).is_empty());
    }

    #[tokio::test]
    async fn inactive_role_lists_no_permissions() {
        let f = fixture().await;
        let ops = f.store.role_by_code(&RoleCode::new("OPERATIONS")).await.unwrap().unwrap();
        f.admin
            .update_role(
                &f.root,
                UpdateRole {
                    role_id: ops.role.id,
                    changes: RoleChanges {
                        is_active: Some(false),
                        ..RoleChanges::default()
                    },
                },
            )
            .await
            .unwrap();

        let permissions = f.admin.list_permissions_for_role(&f.root, ops.role.id).await.unwrap();
        assert!(permissions.is_empty());
    }

    #[tokio::test]
    async fn permission_toggle_is_audited() {
        let f = fixture().await;
        let toggled = f
            .admin
            .set_permission_active(
                &f.root,
                SetPermissionActive {
                    code: PermissionCode::new(codes::RECONCILIATION_AI_ERROR_DETECTION),
                    is_active: false,
                },
            )
            .await
            .unwrap();
        assert!(!toggled.is_active);

        let events = admin_events(&f.audit);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, AdminAction::PermissionChange);
        assert_eq!(events[0].resource_type, ResourceType::Permission);
    }

    #[tokio::test]
    async fn administration_permissions_cannot_be_switched_off() {
        let f = fixture().await;
        for code in [codes::SYSTEM_ROLES_MANAGE, codes::SYSTEM_SETTINGS_UPDATE] {
            let err = f
                .admin
                .set_permission_active(
                    &f.root,
                    SetPermissionActive {
                        code: PermissionCode::new(code),
                        is_active: false,
                    },
                )
                .await
                .unwrap_err();
            assert!(matches!(err, RbacError::InvalidOperation(_)));

            let permission = f.store.permission_by_code(&PermissionCode::new(code)).await.unwrap().unwrap();
            assert!(permission.is_active);
        }

        // ADMIN still administers.
        assert!(f.admin.create_role(&f.root, new_role("MANAGER", vec![])).await.is_ok());
        let failures = admin_events(&f.audit)
            .into_iter()
            .filter(|e| e.status == AuditStatus::Failure)
            .count();
        assert_eq!(failures, 2);
    }

    #[tokio::test]
    async fn admin_role_cannot_be_deactivated() {
        let f = fixture().await;
        let admin_role = f.store.role_by_code(&RoleCode::new("ADMIN")).await.unwrap().unwrap();

        let err = f
            .admin
            .update_role(
                &f.root,
                UpdateRole {
                    role_id: admin_role.role.id,
                    changes: RoleChanges {
                        is_active: Some(false),
                        ..RoleChanges::default()
                    },
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RbacError::InvalidOperation(_)));

        let current = f.store.role_by_id(admin_role.role.id).await.unwrap().unwrap();
        assert!(current.role.is_active);
        assert!(f.admin.list_roles(&f.root, RoleFilter::default()).await.is_ok());
    }

    #[tokio::test]
    async fn user_reader_can_browse_registry() {
        let f = fixture().await;
        let reader_role = f
            .admin
            .create_role(&f.root, new_role("AUDITOR", vec![id_of(&f.store, codes::USERS_READ).await]))
            .await
            .unwrap();
        let reader = Principal::new(UserId::new(), reader_role.role.code.clone());

        let roles = f.admin.list_roles(&reader, RoleFilter::default()).await.unwrap();
        assert!(roles.windows(2).all(|w| w[0].role.name <= w[1].role.name));
        let permissions = f
            .admin
            .list_permissions(&reader, PermissionFilter::default())
            .await
            .unwrap();
        assert!(!permissions.is_empty());
        assert!(f
            .admin
            .lookup_permission(&reader, &PermissionCode::new(codes::USERS_READ))
            .await
            .is_ok());
    }
}
