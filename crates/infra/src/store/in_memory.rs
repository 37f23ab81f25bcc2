use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use guardian_auth::guard::{check_permission_toggle, check_role_delete};
use guardian_auth::registry::validate_permission_batch;
use guardian_auth::{
    Permission, PermissionCode, PermissionFilter, PolicySnapshot, Principal, RbacError, Role,
    RoleChanges, RoleCode, RoleFilter, RoleGrants,
};
use guardian_core::{PermissionId, RoleId, UserId};

use super::{RbacStore, RoleSeed, SeedReport, StoreError, UserDirectory};

#[derive(Debug, Default)]
struct State {
    permissions: BTreeMap<PermissionCode, Permission>,
    roles: HashMap<RoleId, Role>,
    edges: HashMap<RoleId, HashSet<PermissionId>>,
    users: HashMap<UserId, Principal>,
}

impl State {
    fn grants(&self, role: &Role) -> RoleGrants {
        RoleGrants {
            role: role.clone(),
            granted: self.edges.get(&role.id).cloned().unwrap_or_default(),
        }
    }

    fn role_by_code(&self, code: &RoleCode) -> Option<&Role> {
        self.roles.values().find(|r| &r.code == code)
    }

    fn live_role(&self, id: RoleId) -> Result<&Role, RbacError> {
        self.roles
            .get(&id)
            .filter(|r| !r.is_deleted())
            .ok_or_else(|| RbacError::not_found("role", id))
    }

    fn validate_batch(&self, ids: &[PermissionId]) -> Result<HashSet<PermissionId>, RbacError> {
        let valid = validate_permission_batch(ids, |id| {
            self.permissions
                .values()
                .find(|p| &p.id == id)
                .map(|p| p.is_active)
        })?;
        Ok(valid.into_iter().collect())
    }

    fn count_active_by_role(&self, role: &RoleCode) -> u64 {
        self.users
            .values()
            .filter(|p| &p.role == role && p.is_enabled())
            .count() as u64
    }

    fn live_user(&mut self, id: UserId) -> Result<&mut Principal, RbacError> {
        self.users
            .get_mut(&id)
            .filter(|p| !p.is_deleted)
            .ok_or_else(|| RbacError::not_found("user", id))
    }
}

/// In-memory catalog, registry and user directory behind a single lock.
///
/// Intended for tests/dev. Every operation runs under one lock scope, which
/// gives the same atomicity the Postgres adapter gets from a transaction.
#[derive(Debug, Default)]
pub struct InMemoryRbacStore {
    inner: RwLock<State>,
}

impl InMemoryRbacStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl RbacStore for InMemoryRbacStore {
    async fn snapshot_for_role(&self, role: &RoleCode) -> Result<PolicySnapshot, StoreError> {
        let state = self.read()?;
        let grants = state.role_by_code(role).map(|r| state.grants(r));
        Ok(PolicySnapshot::new(state.permissions.values().cloned(), grants))
    }

    async fn permission_by_code(&self, code: &PermissionCode) -> Result<Option<Permission>, StoreError> {
        Ok(self.read()?.permissions.get(code).cloned())
    }

    async fn role_by_code(&self, code: &RoleCode) -> Result<Option<RoleGrants>, StoreError> {
        let state = self.read()?;
        Ok(state.role_by_code(code).map(|r| state.grants(r)))
    }

    async fn role_by_id(&self, id: RoleId) -> Result<Option<RoleGrants>, StoreError> {
        let state = self.read()?;
        Ok(state.roles.get(&id).map(|r| state.grants(r)))
    }

    async fn list_permissions(&self, filter: PermissionFilter) -> Result<Vec<Permission>, StoreError> {
        let state = self.read()?;
        let mut permissions: Vec<Permission> = state
            .permissions
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        permissions.sort_by(|a, b| a.category.cmp(&b.category).then_with(|| a.name.cmp(&b.name)));
        Ok(permissions)
    }

    async fn list_roles(&self, filter: RoleFilter) -> Result<Vec<RoleGrants>, StoreError> {
        let state = self.read()?;
        let mut roles: Vec<RoleGrants> = state
            .roles
            .values()
            .filter(|r| filter.matches(r))
            .map(|r| state.grants(r))
            .collect();
        roles.sort_by(|a, b| a.role.name.cmp(&b.role.name));
        Ok(roles)
    }

    async fn insert_role(&self, role: Role, permission_ids: Vec<PermissionId>) -> Result<RoleGrants, StoreError> {
        let mut state = self.write()?;
        if state.role_by_code(&role.code).is_some() {
            return Err(RbacError::duplicate("code", format!("role code '{}' already exists", role.code)).into());
        }
        let granted = state.validate_batch(&permission_ids)?;

        state.edges.insert(role.id, granted.clone());
        state.roles.insert(role.id, role.clone());
        Ok(RoleGrants { role, granted })
    }

    async fn update_role(&self, id: RoleId, changes: RoleChanges) -> Result<RoleGrants, StoreError> {
        let mut state = self.write()?;
        let current = state.live_role(id)?.clone();
        let updated = changes.apply_to(&current)?;

        if changes.changes_code(&current) && state.role_by_code(&updated.code).is_some() {
            return Err(RbacError::duplicate("code", format!("role code '{}' already exists", updated.code)).into());
        }
        let granted = match &changes.permission_ids {
            Some(ids) => Some(state.validate_batch(ids)?),
            None => None,
        };

        // Principals reference roles by code.
        if updated.code != current.code {
            for user in state.users.values_mut().filter(|u| u.role == current.code) {
                user.role = updated.code.clone();
            }
        }
        if let Some(granted) = granted {
            state.edges.insert(id, granted);
        }
        state.roles.insert(id, updated.clone());
        Ok(state.grants(&updated))
    }

    async fn delete_role(&self, id: RoleId, deleted_at: DateTime<Utc>) -> Result<Role, StoreError> {
        let mut state = self.write()?;
        let role = state.live_role(id)?.clone();
        check_role_delete(&role, state.count_active_by_role(&role.code))?;

        let deleted = Role {
            deleted_at: Some(deleted_at),
            ..role
        };
        state.roles.insert(id, deleted.clone());
        Ok(deleted)
    }

    async fn set_permission_active(&self, code: &PermissionCode, is_active: bool) -> Result<Permission, StoreError> {
        check_permission_toggle(code, is_active)?;
        let mut state = self.write()?;
        let permission = state
            .permissions
            .get_mut(code)
            .ok_or_else(|| RbacError::not_found("permission", code))?;
        permission.is_active = is_active;
        Ok(permission.clone())
    }

    async fn seed(&self, permissions: Vec<Permission>, roles: Vec<RoleSeed>) -> Result<SeedReport, StoreError> {
        let mut state = self.write()?;
        let mut report = SeedReport::default();

        for permission in permissions {
            if !state.permissions.contains_key(&permission.code) {
                state.permissions.insert(permission.code.clone(), permission);
                report.permissions_inserted += 1;
            }
        }

        for RoleSeed { role, grants } in roles {
            if state.role_by_code(&role.code).is_some() {
                continue;
            }
            let granted: HashSet<PermissionId> = grants
                .iter()
                .filter_map(|code| state.permissions.get(code).map(|p| p.id))
                .collect();
            state.edges.insert(role.id, granted);
            state.roles.insert(role.id, role);
            report.roles_inserted += 1;
        }

        Ok(report)
    }
}

#[async_trait::async_trait]
impl UserDirectory for InMemoryRbacStore {
    async fn principal(&self, id: UserId) -> Result<Option<Principal>, StoreError> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    async fn insert_principal(&self, principal: Principal) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if state.users.contains_key(&principal.user_id) {
            return Err(RbacError::duplicate("user_id", format!("user {} already exists", principal.user_id)).into());
        }
        state.users.insert(principal.user_id, principal);
        Ok(())
    }

    async fn set_active(&self, id: UserId, is_active: bool) -> Result<Principal, StoreError> {
        let mut state = self.write()?;
        let user = state.live_user(id)?;
        user.is_active = is_active;
        Ok(user.clone())
    }

    async fn soft_delete(&self, id: UserId) -> Result<Principal, StoreError> {
        let mut state = self.write()?;
        let user = state
            .users
            .get_mut(&id)
            .ok_or_else(|| RbacError::not_found("user", id))?;
        if user.is_deleted {
            return Err(RbacError::Conflict {
                field: None,
                message: format!("user {id} is already deleted"),
                count: None,
            }
            .into());
        }
        user.is_deleted = true;
        user.is_active = false;
        Ok(user.clone())
    }

    async fn assign_role(&self, id: UserId, role: &RoleCode) -> Result<Principal, StoreError> {
        let mut state = self.write()?;
        match state.role_by_code(role) {
            None => return Err(RbacError::not_found("role", role).into()),
            Some(r) if !r.is_resolvable() => {
                return Err(RbacError::validation("role", format!("role '{role}' is inactive")).into());
            }
            Some(_) => {}
        }
        let user = state.live_user(id)?;
        user.role = role.clone();
        Ok(user.clone())
    }

    async fn count_active_by_role(&self, role: &RoleCode) -> Result<u64, StoreError> {
        Ok(self.read()?.count_active_by_role(role))
    }
}

#[cfg(test)]
mod tests {
    use guardian_auth::catalog::{SYSTEM_PERMISSIONS, codes};
    use guardian_auth::{NewRole, SystemRole};

    use super::*;
    use crate::seed::seed_catalog;

    async fn seeded() -> InMemoryRbacStore {
        let store = InMemoryRbacStore::new();
        seed_catalog(&store).await.unwrap();
        store
    }

    async fn permission_id(store: &InMemoryRbacStore, code: &'static str) -> PermissionId {
        store
            .permission_by_code(&PermissionCode::new(code))
            .await
            .unwrap()
            .unwrap()
            .id
    }

    fn manager(permission_ids: Vec<PermissionId>) -> (Role, Vec<PermissionId>) {
        NewRole {
            code: "manager".into(),
            name: "Manager".into(),
            description: None,
            permission_ids,
        }
        .into_role()
        .unwrap()
    }

    #[tokio::test]
    async fn seeding_twice_inserts_once() {
        let store = InMemoryRbacStore::new();
        let first = seed_catalog(&store).await.unwrap();
        assert_eq!(first.permissions_inserted, SYSTEM_PERMISSIONS.len());
        assert_eq!(first.roles_inserted, SystemRole::ALL.len());

        store
            .set_permission_active(&PermissionCode::new(codes::REPORTS_EXPORT), false)
            .await
            .unwrap();
        let second = seed_catalog(&store).await.unwrap();
        assert_eq!(second, SeedReport::default());

        let export = store
            .permission_by_code(&PermissionCode::new(codes::REPORTS_EXPORT))
            .await
            .unwrap()
            .unwrap();
        assert!(!export.is_active, "seeding must not reset active flags");
    }

    #[tokio::test]
    async fn insert_with_inactive_permission_is_atomic() {
        let store = seeded().await;
        let a = permission_id(&store, codes::REPORTS_EXPORT).await;
        let b = permission_id(&store, codes::USERS_READ).await;
        store
            .set_permission_active(&PermissionCode::new(codes::USERS_READ), false)
            .await
            .unwrap();

        let (role, ids) = manager(vec![a, b]);
        let err = RbacError::from(store.insert_role(role, ids).await.unwrap_err());
        let RbacError::Validation {
            invalid_permission_ids,
            ..
        } = err
        else {
            panic!("expected validation error, got {err:?}");
        };
        assert_eq!(invalid_permission_ids, vec![b]);
        assert!(store.role_by_code(&RoleCode::new("MANAGER")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_code_is_case_insensitive_and_includes_deleted() {
        let store = seeded().await;
        let (role, ids) = manager(vec![]);
        let id = role.id;
        store.insert_role(role, ids).await.unwrap();
        store.delete_role(id, Utc::now()).await.unwrap();

        let (again, ids) = manager(vec![]);
        let err = RbacError::from(store.insert_role(again, ids).await.unwrap_err());
        assert!(matches!(err, RbacError::Conflict { field: Some("code"), .. }));
    }

    #[tokio::test]
    async fn failed_edge_replacement_keeps_previous_set() {
        let store = seeded().await;
        let a = permission_id(&store, codes::REPORTS_EXPORT).await;
        let (role, ids) = manager(vec![a]);
        let id = role.id;
        store.insert_role(role, ids).await.unwrap();

        let bogus = PermissionId::new();
        assert!(store
            .update_role(id, RoleChanges::permissions(vec![bogus]))
            .await
            .is_err());
        let current = store.role_by_id(id).await.unwrap().unwrap();
        assert_eq!(current.granted, HashSet::from([a]));
    }

    #[tokio::test]
    async fn code_change_follows_assigned_principals() {
        let store = seeded().await;
        let (role, ids) = manager(vec![]);
        let id = role.id;
        store.insert_role(role, ids).await.unwrap();
        let user = Principal::new(UserId::new(), "MANAGER");
        store.insert_principal(user.clone()).await.unwrap();

        let changes = RoleChanges {
            code: Some("team_lead".into()),
            ..RoleChanges::default()
        };
        store.update_role(id, changes).await.unwrap();

        let moved = store.principal(user.user_id).await.unwrap().unwrap();
        assert_eq!(moved.role.as_str(), "TEAM_LEAD");
    }

    #[tokio::test]
    async fn deleting_a_deleted_user_conflicts() {
        let store = seeded().await;
        let user = Principal::new(UserId::new(), SystemRole::Operations);
        store.insert_principal(user.clone()).await.unwrap();

        store.soft_delete(user.user_id).await.unwrap();
        let err = RbacError::from(store.soft_delete(user.user_id).await.unwrap_err());
        assert!(matches!(err, RbacError::Conflict { .. }));
    }

    #[tokio::test]
    async fn assigning_inactive_role_is_rejected() {
        let store = seeded().await;
        let (role, ids) = manager(vec![]);
        let id = role.id;
        store.insert_role(role, ids).await.unwrap();
        let changes = RoleChanges {
            is_active: Some(false),
            ..RoleChanges::default()
        };
        store.update_role(id, changes).await.unwrap();

        let user = Principal::new(UserId::new(), SystemRole::Operations);
        store.insert_principal(user.clone()).await.unwrap();
        let err = RbacError::from(
            store
                .assign_role(user.user_id, &RoleCode::new("MANAGER"))
                .await
                .unwrap_err(),
        );
        assert!(matches!(err, RbacError::Validation { field: "role", .. }));
    }

    #[tokio::test]
    async fn permissions_are_listed_by_category_then_name() {
        let store = seeded().await;
        let all = store.list_permissions(PermissionFilter::default()).await.unwrap();
        assert_eq!(all.len(), SYSTEM_PERMISSIONS.len());
        assert!(all.windows(2).all(|w| (w[0].category, &w[0].name) <= (w[1].category, &w[1].name)));
    }
}
