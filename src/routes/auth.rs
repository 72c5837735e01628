use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::app::AppState;
use crate::authn::AuthUser;
use crate::authz::AuthFailurePayload;
use crate::client::{event_app_menu, MenuGroup, SessionPermissionSnapshot, SessionState, WorkContext};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::models::user::{AuthResponse, Identity, LoginRequest};
use crate::utils::verify_password;

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    message: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct NavigationQuery {
    /// Event currently selected in the work context
    pub event_id: Option<Uuid>,
}

async fn snapshot_of(state: &AppState, identity: &Identity) -> SessionPermissionSnapshot {
    let permissions = state.permissions.resolve(identity.id).await;
    SessionPermissionSnapshot::from_identity(identity, &permissions)
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let db_user = state
        .directory
        .find_user_by_email(&payload.email)
        .await?
        .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;

    if !verify_password(&payload.password, &db_user.password_hash)? {
        tracing::debug!(user_id = %db_user.id, "password mismatch");
        return Err(AppError::unauthorized("invalid credentials"));
    }

    let identity = state
        .directory
        .fetch_identity(db_user.id)
        .await?
        .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;

    let token = state.jwt.encode(identity.id)?;
    let user = snapshot_of(&state, &identity).await;

    log_activity_with_context(
        &state.event_bus,
        "login",
        Some(identity.id),
        &identity,
        None,
        Some(RequestContext::from_headers(&headers)),
    );
    tracing::info!(user_id = %identity.id, roles = ?identity.role_names(), "user signed in");

    Ok(Json(AuthResponse { token, user }))
}

/// Validates the bearer token and returns a fresh permission snapshot.
#[utoipa::path(
    get,
    path = "/auth/session",
    tag = "Auth",
    responses(
        (status = 200, description = "Current session", body = SessionPermissionSnapshot),
        (status = 401, description = "Missing, invalid or expired token", body = AuthFailurePayload)
    ),
    security(("bearerAuth" = []))
)]
pub async fn session(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<SessionPermissionSnapshot>> {
    Ok(Json(snapshot_of(&state, &auth.identity).await))
}

/// Menu for the current session. Advisory: every entry's target is guarded
/// on its own.
#[utoipa::path(
    get,
    path = "/auth/navigation",
    tag = "Auth",
    params(NavigationQuery),
    responses(
        (status = 200, description = "Navigation menu", body = Vec<MenuGroup>),
        (status = 401, description = "Not authenticated", body = AuthFailurePayload)
    ),
    security(("bearerAuth" = []))
)]
pub async fn navigation(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<NavigationQuery>,
) -> AppResult<Json<Vec<MenuGroup>>> {
    let session = SessionState::Ready(snapshot_of(&state, &auth.identity).await);
    let menu = event_app_menu(WorkContext {
        selected_event: query.event_id,
    });
    Ok(Json(menu.compose_for(&session)))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Auth",
    responses(
        (status = 200, description = "Logout acknowledged", body = MessageResponse),
        (status = 401, description = "Not authenticated", body = AuthFailurePayload)
    ),
    security(("bearerAuth" = []))
)]
pub async fn logout(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<MessageResponse>> {
    crate::events::log_activity(&state.event_bus, "logout", Some(auth.identity.id), &auth.identity);

    Ok(Json(MessageResponse {
        message: "Logged out".to_string(),
    }))
}
