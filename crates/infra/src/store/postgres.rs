//! Postgres-backed catalog, registry and user directory.
//!
//! ## Consistency
//!
//! - `snapshot_for_role` reads the catalog, the role and its edges in one
//!   `REPEATABLE READ` read-only transaction.
//! - Every mutation runs in one transaction. Role rows are locked
//!   (`FOR UPDATE` / `FOR SHARE`) so that a role deletion and a concurrent role
//!   assignment cannot both succeed.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Rejected(Conflict)` |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed / Io / Other | N/A | `Backend` |

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use guardian_auth::guard::{check_permission_toggle, check_role_delete};
use guardian_auth::registry::validate_permission_batch;
use guardian_auth::{
    Permission, PermissionAction, PermissionCategory, PermissionCode, PermissionFilter,
    PolicySnapshot, Principal, RbacError, Role, RoleChanges, RoleCode, RoleFilter, RoleGrants,
    RoleKind,
};
use guardian_core::{PermissionId, RoleId, UserId};

use super::{RbacStore, RoleSeed, SeedReport, StoreError, UserDirectory};

/// Tables used by the engine. Applied by [`PostgresRbacStore::ensure_schema`].
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS permissions (
    id          UUID PRIMARY KEY,
    code        TEXT NOT NULL UNIQUE,
    name        TEXT NOT NULL,
    description TEXT,
    category    TEXT NOT NULL,
    action      TEXT NOT NULL,
    resource    TEXT NOT NULL,
    is_active   BOOLEAN NOT NULL DEFAULT TRUE,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS roles (
    id             UUID PRIMARY KEY,
    code           TEXT NOT NULL UNIQUE CHECK (code = UPPER(code)),
    name           TEXT NOT NULL CHECK (LENGTH(TRIM(name)) > 0),
    description    TEXT,
    is_system_role BOOLEAN NOT NULL DEFAULT FALSE,
    is_active      BOOLEAN NOT NULL DEFAULT TRUE,
    deleted_at     TIMESTAMPTZ,
    created_at     TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS role_permissions (
    role_id       UUID NOT NULL REFERENCES roles (id),
    permission_id UUID NOT NULL REFERENCES permissions (id),
    PRIMARY KEY (role_id, permission_id)
);

CREATE TABLE IF NOT EXISTS users (
    id         UUID PRIMARY KEY,
    role_code  TEXT NOT NULL,
    is_active  BOOLEAN NOT NULL DEFAULT TRUE,
    is_deleted BOOLEAN NOT NULL DEFAULT FALSE
);

CREATE INDEX IF NOT EXISTS users_role_code_idx ON users (role_code);

CREATE TABLE IF NOT EXISTS audit_logs (
    id            UUID PRIMARY KEY,
    event_type    TEXT NOT NULL,
    actor_id      UUID NOT NULL,
    action        TEXT NOT NULL,
    resource_type TEXT,
    resource_id   TEXT,
    status        TEXT NOT NULL,
    description   TEXT,
    details       JSONB NOT NULL,
    created_at    TIMESTAMPTZ NOT NULL
);
"#;

const PERMISSION_COLUMNS: &str = "id, code, name, description, category, action, resource, is_active";
const ROLE_COLUMNS: &str = "id, code, name, description, is_system_role, is_active, deleted_at";
const USER_COLUMNS: &str = "id, role_code, is_active, is_deleted";

/// Postgres adapter implementing both [`RbacStore`] and [`UserDirectory`].
///
/// Uses the SQLx connection pool, which is `Send + Sync`.
#[derive(Debug, Clone)]
pub struct PostgresRbacStore {
    pool: Arc<PgPool>,
}

impl PostgresRbacStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the tables if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl RbacStore for PostgresRbacStore {
    #[instrument(skip(self), fields(role = %role), err)]
    async fn snapshot_for_role(&self, role: &RoleCode) -> Result<PolicySnapshot, StoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin_transaction", e))?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_isolation", e))?;

        let catalog = load_permissions(&mut tx, PermissionFilter::default()).await?;
        let grants = match role_row_by_code(&mut tx, role, "").await? {
            Some(role) => Some(load_grants(&mut tx, role).await?),
            None => None,
        };

        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(PolicySnapshot::new(catalog, grants))
    }

    #[instrument(skip(self), fields(code = %code), err)]
    async fn permission_by_code(&self, code: &PermissionCode) -> Result<Option<Permission>, StoreError> {
        let row = sqlx::query(&format!("SELECT {PERMISSION_COLUMNS} FROM permissions WHERE code = $1"))
            .bind(code.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("permission_by_code", e))?;
        row.as_ref().map(permission_from_row).transpose()
    }

    #[instrument(skip(self), fields(code = %code), err)]
    async fn role_by_code(&self, code: &RoleCode) -> Result<Option<RoleGrants>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(|e| map_sqlx_error("acquire", e))?;
        match role_row_by_code(&mut conn, code, "").await? {
            Some(role) => Ok(Some(load_grants(&mut conn, role).await?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self), fields(role_id = %id), err)]
    async fn role_by_id(&self, id: RoleId) -> Result<Option<RoleGrants>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(|e| map_sqlx_error("acquire", e))?;
        match role_row_by_id(&mut conn, id, "").await? {
            Some(role) => Ok(Some(load_grants(&mut conn, role).await?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self), err)]
    async fn list_permissions(&self, filter: PermissionFilter) -> Result<Vec<Permission>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(|e| map_sqlx_error("acquire", e))?;
        load_permissions(&mut conn, filter).await
    }

    #[instrument(skip(self), err)]
    async fn list_roles(&self, filter: RoleFilter) -> Result<Vec<RoleGrants>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(|e| map_sqlx_error("acquire", e))?;
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ROLE_COLUMNS}
            FROM roles
            WHERE ($1::boolean IS NULL OR is_active = $1)
              AND ($2 OR NOT is_system_role)
              AND ($3 OR deleted_at IS NULL)
            ORDER BY name ASC
            "#
        ))
        .bind(filter.is_active)
        .bind(filter.include_system)
        .bind(filter.include_deleted)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("list_roles", e))?;

        let roles = rows.iter().map(role_from_row).collect::<Result<Vec<_>, _>>()?;
        let ids: Vec<Uuid> = roles.iter().map(|r| *r.id.as_uuid()).collect();
        let mut edges = load_edges(&mut conn, &ids).await?;

        Ok(roles
            .into_iter()
            .map(|role| RoleGrants {
                granted: edges.remove(&role.id).unwrap_or_default(),
                role,
            })
            .collect())
    }

    #[instrument(skip(self, role, permission_ids), fields(code = %role.code), err)]
    async fn insert_role(&self, role: Role, permission_ids: Vec<PermissionId>) -> Result<RoleGrants, StoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin_transaction", e))?;

        if role_row_by_code(&mut tx, &role.code, "FOR UPDATE").await?.is_some() {
            return Err(RbacError::duplicate("code", format!("role code '{}' already exists", role.code)).into());
        }
        let granted = validate_batch(&mut tx, &permission_ids).await?;

        sqlx::query(
            r#"
            INSERT INTO roles (id, code, name, description, is_system_role, is_active, deleted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(role.id.as_uuid())
        .bind(role.code.as_str())
        .bind(&role.name)
        .bind(&role.description)
        .bind(role.is_system_role())
        .bind(role.is_active)
        .bind(role.deleted_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_role", e))?;
        replace_edges(&mut tx, role.id, &granted).await?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(RoleGrants { role, granted })
    }

    #[instrument(skip(self, changes), fields(role_id = %id), err)]
    async fn update_role(&self, id: RoleId, changes: RoleChanges) -> Result<RoleGrants, StoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let current = role_row_by_id(&mut tx, id, "FOR UPDATE")
            .await?
            .filter(|r| !r.is_deleted())
            .ok_or_else(|| RbacError::not_found("role", id))?;
        let updated = changes.apply_to(&current)?;

        if changes.changes_code(&current) && role_row_by_code(&mut tx, &updated.code, "").await?.is_some() {
            return Err(RbacError::duplicate("code", format!("role code '{}' already exists", updated.code)).into());
        }
        let granted = match &changes.permission_ids {
            Some(ids) => Some(validate_batch(&mut tx, ids).await?),
            None => None,
        };

        sqlx::query("UPDATE roles SET code = $2, name = $3, description = $4, is_active = $5 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(updated.code.as_str())
            .bind(&updated.name)
            .bind(&updated.description)
            .bind(updated.is_active)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_role", e))?;

        if updated.code != current.code {
            sqlx::query("UPDATE users SET role_code = $2 WHERE role_code = $1")
                .bind(current.code.as_str())
                .bind(updated.code.as_str())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("rename_role_code", e))?;
        }
        if let Some(granted) = &granted {
            replace_edges(&mut tx, id, granted).await?;
        }

        let grants = load_grants(&mut tx, updated).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(grants)
    }

    #[instrument(skip(self), fields(role_id = %id), err)]
    async fn delete_role(&self, id: RoleId, deleted_at: DateTime<Utc>) -> Result<Role, StoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let role = role_row_by_id(&mut tx, id, "FOR UPDATE")
            .await?
            .filter(|r| !r.is_deleted())
            .ok_or_else(|| RbacError::not_found("role", id))?;
        let assignees = count_active(&mut tx, &role.code).await?;
        check_role_delete(&role, assignees)?;

        sqlx::query("UPDATE roles SET deleted_at = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(deleted_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_role", e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(Role {
            deleted_at: Some(deleted_at),
            ..role
        })
    }

    #[instrument(skip(self), fields(code = %code), err)]
    async fn set_permission_active(&self, code: &PermissionCode, is_active: bool) -> Result<Permission, StoreError> {
        check_permission_toggle(code, is_active)?;
        let row = sqlx::query(&format!(
            "UPDATE permissions SET is_active = $2 WHERE code = $1 RETURNING {PERMISSION_COLUMNS}"
        ))
        .bind(code.as_str())
        .bind(is_active)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("set_permission_active", e))?;

        match row {
            Some(row) => permission_from_row(&row),
            None => Err(RbacError::not_found("permission", code).into()),
        }
    }

    #[instrument(skip(self, permissions, roles), err)]
    async fn seed(&self, permissions: Vec<Permission>, roles: Vec<RoleSeed>) -> Result<SeedReport, StoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin_transaction", e))?;
        let mut report = SeedReport::default();

        for p in &permissions {
            let inserted = sqlx::query(
                r#"
                INSERT INTO permissions (id, code, name, description, category, action, resource, is_active)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (code) DO NOTHING
                "#,
            )
            .bind(p.id.as_uuid())
            .bind(p.code.as_str())
            .bind(&p.name)
            .bind(&p.description)
            .bind(p.category.as_str())
            .bind(p.action.as_str())
            .bind(&p.resource)
            .bind(p.is_active)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("seed_permission", e))?
            .rows_affected();
            report.permissions_inserted += inserted as usize;
        }

        for RoleSeed { role, grants } in &roles {
            let inserted = sqlx::query(
                r#"
                INSERT INTO roles (id, code, name, description, is_system_role, is_active)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (code) DO NOTHING
                "#,
            )
            .bind(role.id.as_uuid())
            .bind(role.code.as_str())
            .bind(&role.name)
            .bind(&role.description)
            .bind(role.is_system_role())
            .bind(role.is_active)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("seed_role", e))?
            .rows_affected();
            if inserted == 0 {
                continue;
            }

            let codes: Vec<&str> = grants.iter().map(|c| c.as_str()).collect();
            sqlx::query(
                r#"
                INSERT INTO role_permissions (role_id, permission_id)
                SELECT $1, id FROM permissions WHERE code = ANY($2)
                "#,
            )
            .bind(role.id.as_uuid())
            .bind(&codes)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("seed_role_permissions", e))?;
            report.roles_inserted += 1;
        }

        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(report)
    }
}

#[async_trait::async_trait]
impl UserDirectory for PostgresRbacStore {
    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn principal(&self, id: UserId) -> Result<Option<Principal>, StoreError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("principal", e))?;
        row.as_ref().map(principal_from_row).transpose()
    }

    #[instrument(skip(self, principal), fields(user_id = %principal.user_id), err)]
    async fn insert_principal(&self, principal: Principal) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO users (id, role_code, is_active, is_deleted) VALUES ($1, $2, $3, $4)")
            .bind(principal.user_id.as_uuid())
            .bind(principal.role.as_str())
            .bind(principal.is_active)
            .bind(principal.is_deleted)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_principal", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn set_active(&self, id: UserId, is_active: bool) -> Result<Principal, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE users SET is_active = $2 WHERE id = $1 AND NOT is_deleted RETURNING {USER_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(is_active)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("set_active", e))?;

        match row {
            Some(row) => principal_from_row(&row),
            None => Err(RbacError::not_found("user", id).into()),
        }
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn soft_delete(&self, id: UserId) -> Result<Principal, StoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE"))
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("load_user", e))?;
        let user = match row {
            Some(row) => principal_from_row(&row)?,
            None => return Err(RbacError::not_found("user", id).into()),
        };
        if user.is_deleted {
            return Err(RbacError::Conflict {
                field: None,
                message: format!("user {id} is already deleted"),
                count: None,
            }
            .into());
        }

        sqlx::query("UPDATE users SET is_deleted = TRUE, is_active = FALSE WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("soft_delete", e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(Principal {
            is_active: false,
            is_deleted: true,
            ..user
        })
    }

    #[instrument(skip(self), fields(user_id = %id, role = %role), err)]
    async fn assign_role(&self, id: UserId, role: &RoleCode) -> Result<Principal, StoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin_transaction", e))?;

        match role_row_by_code(&mut tx, role, "FOR SHARE").await? {
            None => return Err(RbacError::not_found("role", role).into()),
            Some(r) if !r.is_resolvable() => {
                return Err(RbacError::validation("role", format!("role '{role}' is inactive")).into());
            }
            Some(_) => {}
        }

        let row = sqlx::query(&format!(
            "UPDATE users SET role_code = $2 WHERE id = $1 AND NOT is_deleted RETURNING {USER_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(role.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("assign_role", e))?;
        let user = match row {
            Some(row) => principal_from_row(&row)?,
            None => return Err(RbacError::not_found("user", id).into()),
        };

        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(user)
    }

    #[instrument(skip(self), fields(role = %role), err)]
    async fn count_active_by_role(&self, role: &RoleCode) -> Result<u64, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(|e| map_sqlx_error("acquire", e))?;
        count_active(&mut conn, role).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Queries shared by several operations
// ─────────────────────────────────────────────────────────────────────────────

async fn load_permissions(conn: &mut PgConnection, filter: PermissionFilter) -> Result<Vec<Permission>, StoreError> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {PERMISSION_COLUMNS}
        FROM permissions
        WHERE ($1::text IS NULL OR category = $1)
          AND ($2::boolean IS NULL OR is_active = $2)
        ORDER BY category ASC, name ASC
        "#
    ))
    .bind(filter.category.map(|c| c.as_str()))
    .bind(filter.is_active)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("load_permissions", e))?;
    rows.iter().map(permission_from_row).collect()
}

/// `lock` is appended verbatim (`""`, `"FOR UPDATE"`, `"FOR SHARE"`).
async fn role_row_by_code(conn: &mut PgConnection, code: &RoleCode, lock: &str) -> Result<Option<Role>, StoreError> {
    let row = sqlx::query(&format!("SELECT {ROLE_COLUMNS} FROM roles WHERE code = $1 {lock}"))
        .bind(code.as_str())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("role_by_code", e))?;
    row.as_ref().map(role_from_row).transpose()
}

async fn role_row_by_id(conn: &mut PgConnection, id: RoleId, lock: &str) -> Result<Option<Role>, StoreError> {
    let row = sqlx::query(&format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1 {lock}"))
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("role_by_id", e))?;
    row.as_ref().map(role_from_row).transpose()
}

async fn load_grants(conn: &mut PgConnection, role: Role) -> Result<RoleGrants, StoreError> {
    let mut edges = load_edges(conn, &[*role.id.as_uuid()]).await?;
    Ok(RoleGrants {
        granted: edges.remove(&role.id).unwrap_or_default(),
        role,
    })
}

async fn load_edges(conn: &mut PgConnection, role_ids: &[Uuid]) -> Result<HashMap<RoleId, HashSet<PermissionId>>, StoreError> {
    let rows = sqlx::query("SELECT role_id, permission_id FROM role_permissions WHERE role_id = ANY($1)")
        .bind(role_ids)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("load_edges", e))?;

    let mut edges: HashMap<RoleId, HashSet<PermissionId>> = HashMap::new();
    for row in rows {
        let role_id: Uuid = row.try_get("role_id").map_err(|e| map_sqlx_error("decode_edge", e))?;
        let permission_id: Uuid = row.try_get("permission_id").map_err(|e| map_sqlx_error("decode_edge", e))?;
        edges
            .entry(RoleId::from_uuid(role_id))
            .or_default()
            .insert(PermissionId::from_uuid(permission_id));
    }
    Ok(edges)
}

async fn replace_edges(conn: &mut PgConnection, role_id: RoleId, granted: &HashSet<PermissionId>) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
        .bind(role_id.as_uuid())
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("clear_edges", e))?;

    let ids: Vec<Uuid> = granted.iter().map(|id| *id.as_uuid()).collect();
    sqlx::query("INSERT INTO role_permissions (role_id, permission_id) SELECT $1, UNNEST($2::uuid[])")
        .bind(role_id.as_uuid())
        .bind(&ids)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("insert_edges", e))?;
    Ok(())
}

async fn validate_batch(conn: &mut PgConnection, ids: &[PermissionId]) -> Result<HashSet<PermissionId>, StoreError> {
    let uuids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
    let rows = sqlx::query("SELECT id, is_active FROM permissions WHERE id = ANY($1)")
        .bind(&uuids)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("validate_permissions", e))?;

    let mut known: HashMap<PermissionId, bool> = HashMap::with_capacity(rows.len());
    for row in rows {
        let id: Uuid = row.try_get("id").map_err(|e| map_sqlx_error("decode_permission", e))?;
        let is_active: bool = row.try_get("is_active").map_err(|e| map_sqlx_error("decode_permission", e))?;
        known.insert(PermissionId::from_uuid(id), is_active);
    }

    let valid = validate_permission_batch(ids, |id| known.get(id).copied())?;
    Ok(valid.into_iter().collect())
}

async fn count_active(conn: &mut PgConnection, role: &RoleCode) -> Result<u64, StoreError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM users WHERE role_code = $1 AND is_active AND NOT is_deleted",
    )
    .bind(role.as_str())
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("count_active_by_role", e))?;
    Ok(count.max(0) as u64)
}

// ─────────────────────────────────────────────────────────────────────────────
// Row decoding
// ─────────────────────────────────────────────────────────────────────────────

fn permission_from_row(row: &PgRow) -> Result<Permission, StoreError> {
    let decode = |e| map_sqlx_error("decode_permission", e);
    let category: String = row.try_get("category").map_err(decode)?;
    let action: String = row.try_get("action").map_err(decode)?;

    Ok(Permission {
        id: PermissionId::from_uuid(row.try_get("id").map_err(decode)?),
        code: PermissionCode::new(row.try_get::<String, _>("code").map_err(decode)?),
        name: row.try_get("name").map_err(decode)?,
        description: row.try_get("description").map_err(decode)?,
        category: PermissionCategory::parse(&category)
            .ok_or_else(|| StoreError::Backend(format!("unknown permission category '{category}'")))?,
        action: PermissionAction::parse(&action)
            .ok_or_else(|| StoreError::Backend(format!("unknown permission action '{action}'")))?,
        resource: row.try_get("resource").map_err(decode)?,
        is_active: row.try_get("is_active").map_err(decode)?,
    })
}

fn role_from_row(row: &PgRow) -> Result<Role, StoreError> {
    let decode = |e| map_sqlx_error("decode_role", e);
    let code = RoleCode::new(row.try_get::<String, _>("code").map_err(decode)?);
    let is_system_role: bool = row.try_get("is_system_role").map_err(decode)?;

    let kind = match (is_system_role, code.system_role()) {
        (true, Some(system)) => RoleKind::System(system),
        (true, None) => return Err(StoreError::Backend(format!("unknown system role '{code}'"))),
        (false, _) => RoleKind::Custom,
    };

    Ok(Role {
        id: RoleId::from_uuid(row.try_get("id").map_err(decode)?),
        code,
        name: row.try_get("name").map_err(decode)?,
        description: row.try_get("description").map_err(decode)?,
        kind,
        is_active: row.try_get("is_active").map_err(decode)?,
        deleted_at: row.try_get("deleted_at").map_err(decode)?,
    })
}

fn principal_from_row(row: &PgRow) -> Result<Principal, StoreError> {
    let decode = |e| map_sqlx_error("decode_user", e);
    Ok(Principal {
        user_id: UserId::from_uuid(row.try_get("id").map_err(decode)?),
        role: RoleCode::new(row.try_get::<String, _>("role_code").map_err(decode)?),
        is_active: row.try_get("is_active").map_err(decode)?,
        is_deleted: row.try_get("is_deleted").map_err(decode)?,
    })
}

/// Map SQLx errors to [`StoreError`].
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // Unique violation
                Some("23505") => RbacError::duplicate("code", msg).into(),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {operation}")),
        other => StoreError::Backend(format!("{operation}: {other}")),
    }
}
