//! SQLite-backed user and role directory.
//!
//! Source of truth for identities, role assignments and role definitions. The
//! authentication and permission cache layers read through it via
//! [`IdentityStore`] and [`PermissionSource`]; the RBAC routes and the CLI write
//! through it.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::row_parsers::{db_user_from_row, permission_from_row, role_ref_from_row};
use crate::authn::IdentityStore;
use crate::authz::PermissionSource;
use crate::errors::AppError;
use crate::models::rbac::{Permission, Role, RoleRef};
use crate::models::user::{DbUser, Identity};

const USER_COLUMNS: &str = "id, name, email, password_hash, created_at, updated_at, deleted_at";

#[derive(Debug, Clone)]
pub struct SqliteDirectory {
    pool: SqlitePool,
}

impl SqliteDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // =========================================================================
    // USERS
    // =========================================================================

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<DbUser>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = ? AND deleted_at IS NULL"
        ))
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(db_user_from_row).transpose()
    }

    pub async fn fetch_identity(&self, user_id: Uuid) -> Result<Option<Identity>, AppError> {
        let mut conn = self.pool.acquire().await?;

        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ? AND deleted_at IS NULL"
        ))
        .bind(user_id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let user = db_user_from_row(&row)?;
        let roles = roles_of(&mut conn, user_id).await?;
        Ok(Some(user.into_identity(roles)))
    }

    /// Creates a user and assigns `roles` in the given order.
    pub async fn create_user(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
        roles: &[String],
    ) -> Result<Identity, AppError> {
        let email = normalize_email(email);
        let mut tx = self.pool.begin().await?;

        let taken: Option<String> = sqlx::query_scalar("SELECT id FROM users WHERE email = ? AND deleted_at IS NULL")
            .bind(&email)
            .fetch_optional(&mut *tx)
            .await?;
        if taken.is_some() {
            return Err(AppError::conflict(format!("email {email} is already registered")));
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO users (id, name, email, password_hash, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(name.trim())
        .bind(&email)
        .bind(password_hash)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for role in roles {
            ensure_role(&mut tx, role).await?;
            sqlx::query("INSERT OR IGNORE INTO user_roles (user_id, role_name, created_at) VALUES (?, ?, ?)")
                .bind(id.to_string())
                .bind(role)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }

        let assigned = roles_of(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(user_id = %id, roles = ?roles, "user created");
        Ok(Identity {
            id,
            name: name.trim().to_string(),
            email,
            roles: assigned,
        })
    }

    // =========================================================================
    // USER-ROLE ASSIGNMENTS
    // =========================================================================

    pub async fn user_roles(&self, user_id: Uuid) -> Result<Vec<RoleRef>, AppError> {
        let mut conn = self.pool.acquire().await?;
        ensure_user(&mut conn, user_id).await?;
        roles_of(&mut conn, user_id).await
    }

    /// Returns `false` when the user already held the role.
    pub async fn assign_role(&self, user_id: Uuid, role: &str) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;
        ensure_user(&mut tx, user_id).await?;
        ensure_role(&mut tx, role).await?;

        let inserted = sqlx::query("INSERT OR IGNORE INTO user_roles (user_id, role_name, created_at) VALUES (?, ?, ?)")
            .bind(user_id.to_string())
            .bind(role)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(inserted > 0)
    }

    /// Fails with `NotFound` when the user did not hold the role.
    pub async fn revoke_role(&self, user_id: Uuid, role: &str) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        ensure_user(&mut tx, user_id).await?;

        let removed = sqlx::query("DELETE FROM user_roles WHERE user_id = ? AND role_name = ?")
            .bind(user_id.to_string())
            .bind(role)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if removed == 0 {
            return Err(AppError::not_found(format!("user does not hold role {role}")));
        }

        tx.commit().await?;
        Ok(())
    }

    // =========================================================================
    // ROLE DEFINITIONS
    // =========================================================================

    pub async fn list_roles(&self) -> Result<Vec<Role>, AppError> {
        let rows = sqlx::query("SELECT name, display_name, description FROM roles ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        let grants = sqlx::query("SELECT role_name, permission_name FROM role_permissions")
            .fetch_all(&self.pool)
            .await?;

        let mut by_role: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for grant in &grants {
            by_role
                .entry(grant.try_get("role_name")?)
                .or_default()
                .push(grant.try_get("permission_name")?);
        }

        rows.iter()
            .map(|row| -> Result<Role, AppError> {
                let name: String = row.try_get("name")?;
                let mut permissions = by_role.remove(&name).unwrap_or_default();
                permissions.sort();
                Ok(Role {
                    display_name: row.try_get("display_name")?,
                    description: row.try_get("description")?,
                    name,
                    permissions,
                })
            })
            .collect()
    }

    pub async fn list_permissions(&self) -> Result<Vec<Permission>, AppError> {
        let rows = sqlx::query("SELECT name, description FROM permissions ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(permission_from_row).collect()
    }

    pub async fn role_permissions(&self, role: &str) -> Result<Vec<String>, AppError> {
        let mut conn = self.pool.acquire().await?;
        ensure_role(&mut conn, role).await?;
        permissions_of_role(&mut conn, role).await
    }

    /// Returns `false` when the role already granted the permission.
    pub async fn grant_role_permission(&self, role: &str, permission: &str) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;
        ensure_role(&mut tx, role).await?;
        ensure_permission(&mut tx, permission).await?;

        let inserted = sqlx::query("INSERT OR IGNORE INTO role_permissions (role_name, permission_name) VALUES (?, ?)")
            .bind(role)
            .bind(permission)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(inserted > 0)
    }

    pub async fn revoke_role_permission(&self, role: &str, permission: &str) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        ensure_role(&mut tx, role).await?;

        let removed = sqlx::query("DELETE FROM role_permissions WHERE role_name = ? AND permission_name = ?")
            .bind(role)
            .bind(permission)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if removed == 0 {
            return Err(AppError::not_found(format!("role {role} does not grant {permission}")));
        }

        tx.commit().await?;
        Ok(())
    }

    /// Redefines the role's permission set. Returns the previous set.
    pub async fn replace_role_permissions(&self, role: &str, permissions: &[String]) -> Result<Vec<String>, AppError> {
        let mut tx = self.pool.begin().await?;
        ensure_role(&mut tx, role).await?;
        for permission in permissions {
            ensure_permission(&mut tx, permission).await?;
        }

        let previous = permissions_of_role(&mut tx, role).await?;

        sqlx::query("DELETE FROM role_permissions WHERE role_name = ?")
            .bind(role)
            .execute(&mut *tx)
            .await?;

        for permission in permissions {
            sqlx::query("INSERT OR IGNORE INTO role_permissions (role_name, permission_name) VALUES (?, ?)")
                .bind(role)
                .bind(permission)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(previous)
    }
}

#[async_trait]
impl IdentityStore for SqliteDirectory {
    async fn find_identity(&self, id: Uuid) -> Result<Option<Identity>, AppError> {
        self.fetch_identity(id).await
    }
}

#[async_trait]
impl PermissionSource for SqliteDirectory {
    async fn load_permissions(&self, identity_id: Uuid) -> Result<BTreeSet<String>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT rp.permission_name
            FROM user_roles ur
            JOIN users u ON u.id = ur.user_id AND u.deleted_at IS NULL
            JOIN role_permissions rp ON rp.role_name = ur.role_name
            WHERE ur.user_id = ?
            "#,
        )
        .bind(identity_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("permission_name").map_err(AppError::from))
            .collect()
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Roles in assignment order.
async fn roles_of(conn: &mut SqliteConnection, user_id: Uuid) -> Result<Vec<RoleRef>, AppError> {
    let rows = sqlx::query(
        r#"
        SELECT r.name, r.display_name
        FROM user_roles ur
        JOIN roles r ON r.name = ur.role_name
        WHERE ur.user_id = ?
        ORDER BY ur.rowid
        "#,
    )
    .bind(user_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(role_ref_from_row).collect()
}

async fn permissions_of_role(conn: &mut SqliteConnection, role: &str) -> Result<Vec<String>, AppError> {
    let permissions = sqlx::query_scalar(
        "SELECT permission_name FROM role_permissions WHERE role_name = ? ORDER BY permission_name",
    )
    .bind(role)
    .fetch_all(&mut *conn)
    .await?;
    Ok(permissions)
}

async fn ensure_user(conn: &mut SqliteConnection, user_id: Uuid) -> Result<(), AppError> {
    let found: Option<String> = sqlx::query_scalar("SELECT id FROM users WHERE id = ? AND deleted_at IS NULL")
        .bind(user_id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    found.map(|_| ()).ok_or_else(|| AppError::not_found(format!("user {user_id} not found")))
}

async fn ensure_role(conn: &mut SqliteConnection, role: &str) -> Result<(), AppError> {
    let found: Option<String> = sqlx::query_scalar("SELECT name FROM roles WHERE name = ?")
        .bind(role)
        .fetch_optional(&mut *conn)
        .await?;
    found.map(|_| ()).ok_or_else(|| AppError::not_found(format!("role {role} not found")))
}

async fn ensure_permission(conn: &mut SqliteConnection, permission: &str) -> Result<(), AppError> {
    let found: Option<String> = sqlx::query_scalar("SELECT name FROM permissions WHERE name = ?")
        .bind(permission)
        .fetch_optional(&mut *conn)
        .await?;
    found.map(|_| ()).ok_or_else(|| AppError::not_found(format!("permission {permission} not found")))
}
