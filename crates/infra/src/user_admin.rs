//! User status administration.
//!
//! Self-targeted checks run before authorization: deactivating or deleting
//! one's own account is an invalid operation for every principal, ADMIN
//! included, whatever capabilities the caller holds.

use chrono::Utc;
use tracing::info;

use guardian_auth::catalog::codes;
use guardian_auth::guard::{check_status_change, check_user_delete};
use guardian_auth::{
    AdminAction, AdminActionEvent, AuditEvent, AuditSink, AuditStatus, Principal, RbacError,
    Requirement, RequiresCapability, ResourceType, RoleCode,
};
use guardian_core::{AuditEventId, UserId};

use crate::enforcer::Enforcer;
use crate::store::{RbacStore, UserDirectory};

#[derive(Debug, Clone, Copy)]
pub struct SetUserStatus {
    pub user_id: UserId,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct DeleteUser {
    pub user_id: UserId,
}

#[derive(Debug, Clone)]
pub struct AssignRole {
    pub user_id: UserId,
    pub role: RoleCode,
}

impl RequiresCapability for SetUserStatus {
    fn requirement(&self) -> Requirement {
        Requirement::single(codes::USERS_UPDATE)
    }
}

impl RequiresCapability for DeleteUser {
    fn requirement(&self) -> Requirement {
        Requirement::single(codes::USERS_DELETE)
    }
}

impl RequiresCapability for AssignRole {
    fn requirement(&self) -> Requirement {
        Requirement::single(codes::USERS_UPDATE)
    }
}

pub struct UserAdmin<S, A, U> {
    enforcer: Enforcer<S, A>,
    users: U,
}

impl<S, A, U> UserAdmin<S, A, U>
where
    S: RbacStore,
    A: AuditSink,
    U: UserDirectory,
{
    pub fn new(enforcer: Enforcer<S, A>, users: U) -> Self {
        Self { enforcer, users }
    }

    /// Activate or deactivate an account.
    pub async fn set_user_status(&self, actor: &Principal, command: SetUserStatus) -> Result<Principal, RbacError> {
        let action = if command.is_active {
            AdminAction::UserActivate
        } else {
            AdminAction::UserDeactivate
        };

        if let Err(err) = check_status_change(actor, command.user_id, command.is_active) {
            self.record(actor, action, command.user_id, Err(&err));
            return Err(err);
        }
        self.enforcer.authorize_operation(actor, &command).await?;

        let outcome = self
            .users
            .set_active(command.user_id, command.is_active)
            .await
            .map_err(RbacError::from);
        self.record(actor, action, command.user_id, outcome.as_ref().map(|_| ()));
        outcome
    }

    /// Soft-delete an account. Deleting an already deleted account conflicts.
    pub async fn delete_user(&self, actor: &Principal, command: DeleteUser) -> Result<Principal, RbacError> {
        if let Err(err) = check_user_delete(actor, command.user_id) {
            self.record(actor, AdminAction::UserDelete, command.user_id, Err(&err));
            return Err(err);
        }
        self.enforcer.authorize_operation(actor, &command).await?;

        let outcome = self.users.soft_delete(command.user_id).await.map_err(RbacError::from);
        self.record(actor, AdminAction::UserDelete, command.user_id, outcome.as_ref().map(|_| ()));
        outcome
    }

    /// Move an account to another live role.
    pub async fn assign_role(&self, actor: &Principal, command: AssignRole) -> Result<Principal, RbacError> {
        self.enforcer.authorize_operation(actor, &command).await?;

        let outcome = self
            .users
            .assign_role(command.user_id, &command.role)
            .await
            .map_err(RbacError::from);
        self.record(actor, AdminAction::RoleAssign, command.user_id, outcome.as_ref().map(|_| ()));
        outcome
    }

    fn record(&self, actor: &Principal, action: AdminAction, target: UserId, outcome: Result<(), &RbacError>) {
        let (status, description, error_kind) = match outcome {
            Ok(()) => (AuditStatus::Success, format!("{} on user {target}", action.as_str()), None),
            Err(err) => (AuditStatus::Failure, err.to_string(), Some(err.kind())),
        };
        info!(
            actor_id = %actor.user_id,
            action = action.as_str(),
            target = %target,
            status = status.as_str(),
            "{description}"
        );
        self.enforcer.emit(AuditEvent::AdminAction(AdminActionEvent {
            event_id: AuditEventId::new(),
            actor_id: actor.user_id,
            action,
            resource_type: ResourceType::User,
            resource_id: target.to_string(),
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

    use super::*;
    use crate::audit::InMemoryAuditSink;
    use crate::seed::seed_catalog;
    use crate::store::InMemoryRbacStore;

    type Admin = UserAdmin<Arc<InMemoryRbacStore>, Arc<InMemoryAuditSink>, Arc<InMemoryRbacStore>>;

    async fn fixture() -> (Admin, Arc<InMemoryRbacStore>, Arc<InMemoryAuditSink>) {
        let store = Arc::new(InMemoryRbacStore::new());
        seed_catalog(&*store).await.unwrap();
        let audit = InMemoryAuditSink::new();
        let admin = UserAdmin::new(Enforcer::new(store.clone(), audit.clone()), store.clone());
        (admin, store, audit)
    }

    async fn user(store: &InMemoryRbacStore, role: SystemRole) -> Principal {
        let principal = Principal::new(UserId::new(), role);
        store.insert_principal(principal.clone()).await.unwrap();
        principal
    }

    #[tokio::test]
    async fn cxo_self_deactivation_is_invalid_and_changes_nothing() {
        let (admin, store, audit) = fixture().await;
        let cxo = user(&store, SystemRole::Cxo).await;

        let err = admin
            .set_user_status(
                &cxo,
                SetUserStatus {
                    user_id: cxo.user_id,
                    is_active: false,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RbacError::InvalidOperation(_)));
        assert!(store.principal(cxo.user_id).await.unwrap().unwrap().is_active);

        let events = audit.events();
        assert_eq!(events.len(), 1, "guard failure is audited, no decision is made");
        assert!(matches!(&events[0], AuditEvent::AdminAction(e) if e.status == AuditStatus::Failure));
    }

    #[tokio::test]
    async fn admin_self_deactivation_is_invalid() {
        let (admin, store, _audit) = fixture().await;
        let root = user(&store, SystemRole::Admin).await;

        let err = admin
            .set_user_status(
                &root,
                SetUserStatus {
                    user_id: root.user_id,
                    is_active: false,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RbacError::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn admin_deactivates_and_reactivates_others() {
        let (admin, store, _audit) = fixture().await;
        let root = user(&store, SystemRole::Admin).await;
        let ops = user(&store, SystemRole::Operations).await;

        let off = admin
            .set_user_status(
                &root,
                SetUserStatus {
                    user_id: ops.user_id,
                    is_active: false,
                },
            )
            .await
            .unwrap();
        assert!(!off.is_active);

        let on = admin
            .set_user_status(
                &root,
                SetUserStatus {
                    user_id: ops.user_id,
                    is_active: true,
                },
            )
            .await
            .unwrap();
        assert!(on.is_active);
    }

    #[tokio::test]
    async fn self_deletion_is_invalid_and_double_delete_conflicts() {
        let (admin, store, _audit) = fixture().await;
        let root = user(&store, SystemRole::Admin).await;
        let ops = user(&store, SystemRole::Operations).await;

        assert!(matches!(
            admin.delete_user(&root, DeleteUser { user_id: root.user_id }).await,
            Err(RbacError::InvalidOperation(_))
        ));

        let deleted = admin.delete_user(&root, DeleteUser { user_id: ops.user_id }).await.unwrap();
        assert!(deleted.is_deleted);
        assert!(matches!(
            admin.delete_user(&root, DeleteUser { user_id: ops.user_id }).await,
            Err(RbacError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn operations_cannot_deactivate_others() {
        let (admin, store, _audit) = fixture().await;
        let ops = user(&store, SystemRole::Operations).await;
        let cxo = user(&store, SystemRole::Cxo).await;

        let err = admin
            .set_user_status(
                &ops,
                SetUserStatus {
                    user_id: cxo.user_id,
                    is_active: false,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RbacError::AuthorizationDenied { .. }));
    }

    #[tokio::test]
    async fn deactivated_user_is_denied_everything() {
        let (admin, store, _audit) = fixture().await;
        let root = user(&store, SystemRole::Admin).await;
        let cxo = user(&store, SystemRole::Cxo).await;

        admin
            .set_user_status(
                &root,
                SetUserStatus {
                    user_id: cxo.user_id,
                    is_active: false,
                },
            )
            .await
            .unwrap();

        let current = store.principal(cxo.user_id).await.unwrap().unwrap();
        let err = admin
            .enforcer
            .authorize(&current, &Requirement::single(codes::REPORTS_EXPORT))
            .await
            .unwrap_err();
        assert!(matches!(err, RbacError::AuthorizationDenied { .. }));
    }

    #[tokio::test]
    async fn role_assignment_requires_a_live_role() {
        let (admin, store, _audit) = fixture().await;
        let root = user(&store, SystemRole::Admin).await;
        let ops = user(&store, SystemRole::Operations).await;

        let moved = admin
            .assign_role(
                &root,
                AssignRole {
                    user_id: ops.user_id,
                    role: RoleCode::new("cxo"),
                },
            )
            .await
            .unwrap();
        assert_eq!(moved.role, RoleCode::from(SystemRole::Cxo));

        assert!(matches!(
            admin
                .assign_role(
                    &root,
                    AssignRole {
                        user_id: ops.user_id,
                        role: RoleCode::new("NOBODY"),
                    },
                )
                .await,
            Err(RbacError::NotFound { .. })
        ));
    }
}
