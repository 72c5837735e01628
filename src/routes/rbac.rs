//! RBAC Admin API Routes
//!
//! Endpoints for managing role definitions and user role assignments. Every
//! write commits first, then invalidates the affected permission cache
//! entries before responding, then publishes a Critical activity event.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use uuid::Uuid;

use crate::app::AppState;
use crate::authn::AuthUser;
use crate::authz::{permission_names as perms, role_names as roles, AuthFailurePayload};
use crate::errors::AppError;
use crate::events::{log_activity_with_context, RequestContext};
use crate::models::rbac::*;

// =============================================================================
// ROUTER
// =============================================================================

pub fn routes(state: &AppState) -> Router<AppState> {
    let admin = &[roles::ADMIN];

    Router::new()
        // Role definitions
        .route("/roles", state.guarded(get(list_roles), admin, perms::ROLES_VIEW))
        .route("/permissions", state.guarded(get(list_permissions), admin, perms::ROLES_VIEW))
        .route(
            "/roles/:role/permissions",
            state.guarded(
                put(replace_role_permissions).post(assign_permission_to_role),
                admin,
                perms::ROLES_MANAGE,
            ),
        )
        .route(
            "/roles/:role/permissions/:permission",
            state.guarded(delete(revoke_permission_from_role), admin, perms::ROLES_MANAGE),
        )
        // User role assignments
        .route(
            "/users/:user_id/roles",
            state
                .guarded(get(get_user_roles), admin, perms::USERS_VIEW)
                .merge(state.guarded(post(assign_role_to_user), admin, perms::USERS_MANAGE)),
        )
        .route(
            "/users/:user_id/roles/:role",
            state.guarded(delete(revoke_role_from_user), admin, perms::USERS_MANAGE),
        )
        // Effective permissions (through the cache)
        .route(
            "/users/:user_id/effective-permissions",
            state.guarded(get(get_effective_permissions), admin, perms::USERS_VIEW),
        )
        .route("/cache/flush", state.guarded(post(flush_permission_cache), admin, perms::ROLES_MANAGE))
}

// =============================================================================
// ROLE ENDPOINTS
// =============================================================================

/// List all roles with the permissions they grant
#[utoipa::path(
    get,
    path = "/rbac/roles",
    tag = "RBAC",
    responses(
        (status = 200, description = "List of roles", body = Vec<Role>),
        (status = 403, description = "Not an administrator", body = AuthFailurePayload),
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_roles(State(state): State<AppState>) -> Result<Json<Vec<Role>>, AppError> {
    Ok(Json(state.directory.list_roles().await?))
}

/// List the permission catalog
#[utoipa::path(
    get,
    path = "/rbac/permissions",
    tag = "RBAC",
    responses(
        (status = 200, description = "List of permissions", body = Vec<Permission>),
        (status = 403, description = "Not an administrator", body = AuthFailurePayload),
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_permissions(State(state): State<AppState>) -> Result<Json<Vec<Permission>>, AppError> {
    Ok(Json(state.directory.list_permissions().await?))
}

/// Redefine the full permission set of a role
#[utoipa::path(
    put,
    path = "/rbac/roles/{role}/permissions",
    tag = "RBAC",
    params(
        ("role" = String, Path, description = "Role name"),
    ),
    request_body = ReplaceRolePermissionsRequest,
    responses(
        (status = 200, description = "Role redefined", body = RoleDefinition),
        (status = 404, description = "Unknown role or permission"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn replace_role_permissions(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(role): Path<String>,
    Json(req): Json<ReplaceRolePermissionsRequest>,
) -> Result<Json<RoleDefinition>, AppError> {
    let mut permissions = req.permissions;
    permissions.sort();
    permissions.dedup();

    let previous = state.directory.replace_role_permissions(&role, &permissions).await?;
    state.permissions.invalidate_all();

    let old = RoleDefinition {
        role: role.clone(),
        permissions: previous,
    };
    let definition = RoleDefinition { role, permissions };

    log_activity_with_context(
        &state.event_bus,
        "redefined",
        Some(auth.identity.id),
        &definition,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(definition))
}

/// Grant a permission to a role
#[utoipa::path(
    post,
    path = "/rbac/roles/{role}/permissions",
    tag = "RBAC",
    params(
        ("role" = String, Path, description = "Role name"),
    ),
    request_body = AssignPermissionRequest,
    responses(
        (status = 201, description = "Permission granted", body = RolePermission),
        (status = 200, description = "Role already granted the permission", body = RolePermission),
        (status = 404, description = "Unknown role or permission"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn assign_permission_to_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(role): Path<String>,
    Json(req): Json<AssignPermissionRequest>,
) -> Result<(StatusCode, Json<RolePermission>), AppError> {
    let granted = state.directory.grant_role_permission(&role, &req.permission).await?;
    state.permissions.invalidate_all();

    let grant = RolePermission {
        role,
        permission: req.permission,
    };

    if !granted {
        return Ok((StatusCode::OK, Json(grant)));
    }

    log_activity_with_context(
        &state.event_bus,
        "granted",
        Some(auth.identity.id),
        &grant,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(grant)))
}

/// Revoke a permission from a role
#[utoipa::path(
    delete,
    path = "/rbac/roles/{role}/permissions/{permission}",
    tag = "RBAC",
    params(
        ("role" = String, Path, description = "Role name"),
        ("permission" = String, Path, description = "Permission name"),
    ),
    responses(
        (status = 204, description = "Permission revoked"),
        (status = 404, description = "Role does not grant the permission"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn revoke_permission_from_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path((role, permission)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    state.directory.revoke_role_permission(&role, &permission).await?;
    state.permissions.invalidate_all();

    log_activity_with_context(
        &state.event_bus,
        "revoked",
        Some(auth.identity.id),
        &RolePermission { role, permission },
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// USER-ROLE ENDPOINTS
// =============================================================================

/// Get roles assigned to a user, in assignment order
#[utoipa::path(
    get,
    path = "/rbac/users/{user_id}/roles",
    tag = "RBAC",
    params(
        ("user_id" = Uuid, Path, description = "User ID"),
    ),
    responses(
        (status = 200, description = "Assigned roles", body = Vec<RoleRef>),
        (status = 404, description = "User not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_user_roles(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<RoleRef>>, AppError> {
    Ok(Json(state.directory.user_roles(user_id).await?))
}

/// Assign a role to a user
#[utoipa::path(
    post,
    path = "/rbac/users/{user_id}/roles",
    tag = "RBAC",
    params(
        ("user_id" = Uuid, Path, description = "User ID"),
    ),
    request_body = AssignRoleRequest,
    responses(
        (status = 201, description = "Role assigned", body = UserRole),
        (status = 200, description = "User already held the role", body = UserRole),
        (status = 404, description = "Unknown user or role"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn assign_role_to_user(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
    Json(req): Json<AssignRoleRequest>,
) -> Result<(StatusCode, Json<UserRole>), AppError> {
    let assigned = state.directory.assign_role(user_id, &req.role).await?;
    state.permissions.invalidate(user_id);

    let assignment = UserRole {
        user_id,
        role: req.role,
        changed_at: Utc::now(),
    };

    if !assigned {
        return Ok((StatusCode::OK, Json(assignment)));
    }

    log_activity_with_context(
        &state.event_bus,
        "assigned",
        Some(auth.identity.id),
        &assignment,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(assignment)))
}

/// Revoke a role from a user
#[utoipa::path(
    delete,
    path = "/rbac/users/{user_id}/roles/{role}",
    tag = "RBAC",
    params(
        ("user_id" = Uuid, Path, description = "User ID"),
        ("role" = String, Path, description = "Role name"),
    ),
    responses(
        (status = 204, description = "Role revoked"),
        (status = 404, description = "User does not hold the role"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn revoke_role_from_user(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path((user_id, role)): Path<(Uuid, String)>,
) -> Result<StatusCode, AppError> {
    state.directory.revoke_role(user_id, &role).await?;
    state.permissions.invalidate(user_id);

    let assignment = UserRole {
        user_id,
        role,
        changed_at: Utc::now(),
    };

    log_activity_with_context(
        &state.event_bus,
        "revoked",
        Some(auth.identity.id),
        &assignment,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// EFFECTIVE PERMISSIONS
// =============================================================================

/// Flattened permissions of a user as the server currently enforces them
#[utoipa::path(
    get,
    path = "/rbac/users/{user_id}/effective-permissions",
    tag = "RBAC",
    params(
        ("user_id" = Uuid, Path, description = "User ID"),
    ),
    responses(
        (status = 200, description = "Effective permissions", body = EffectivePermissions),
        (status = 404, description = "User not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_effective_permissions(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<EffectivePermissions>, AppError> {
    let roles = state.directory.user_roles(user_id).await?;
    let permissions = state.permissions.resolve(user_id).await;

    Ok(Json(EffectivePermissions {
        user_id,
        roles: roles.into_iter().map(|r| r.name).collect(),
        permissions: permissions.to_vec(),
    }))
}

/// Drop every cached permission set
#[utoipa::path(
    post,
    path = "/rbac/cache/flush",
    tag = "RBAC",
    responses(
        (status = 204, description = "Permission cache cleared"),
        (status = 403, description = "Not an administrator", body = AuthFailurePayload),
    ),
    security(("bearerAuth" = []))
)]
pub async fn flush_permission_cache(State(state): State<AppState>, auth: AuthUser) -> StatusCode {
    state.permissions.invalidate_all();

    crate::events::log_activity(
        &state.event_bus,
        "flushed",
        Some(auth.identity.id),
        &PermissionCacheFlush { reason: "manual" },
    );

    StatusCode::NO_CONTENT
}
