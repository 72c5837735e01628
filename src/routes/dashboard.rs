//! Role home pages. Each route sits behind its role gate and dashboard
//! permission; the handlers only shape the response.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app::AppState;
use crate::authn::AuthUser;
use crate::authz::AuthFailurePayload;
use crate::errors::AppResult;

#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardResponse {
    #[schema(example = "coordinator")]
    pub dashboard: &'static str,
    pub user_name: String,
    pub primary_role: Option<String>,
    /// Number of permissions currently resolved for the user
    pub permission_count: usize,
}

async fn render(state: &AppState, auth: AuthUser, dashboard: &'static str) -> AppResult<Json<DashboardResponse>> {
    let permissions = state.permissions.resolve(auth.identity.id).await;
    Ok(Json(DashboardResponse {
        dashboard,
        primary_role: auth.identity.primary_role().map(str::to_string),
        user_name: auth.identity.name,
        permission_count: permissions.len(),
    }))
}

#[utoipa::path(
    get,
    path = "/dashboard/admin",
    tag = "Dashboards",
    responses(
        (status = 200, description = "Administrator dashboard", body = DashboardResponse),
        (status = 401, description = "Not authenticated", body = AuthFailurePayload),
        (status = 403, description = "Role or permission missing", body = AuthFailurePayload)
    ),
    security(("bearerAuth" = []))
)]
pub async fn admin(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<DashboardResponse>> {
    render(&state, auth, "admin").await
}

#[utoipa::path(
    get,
    path = "/dashboard/coordinator",
    tag = "Dashboards",
    responses(
        (status = 200, description = "Coordinator dashboard", body = DashboardResponse),
        (status = 401, description = "Not authenticated", body = AuthFailurePayload),
        (status = 403, description = "Role or permission missing", body = AuthFailurePayload)
    ),
    security(("bearerAuth" = []))
)]
pub async fn coordinator(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<DashboardResponse>> {
    render(&state, auth, "coordinator").await
}

#[utoipa::path(
    get,
    path = "/dashboard/seedbed-leader",
    tag = "Dashboards",
    responses(
        (status = 200, description = "Seedbed leader dashboard", body = DashboardResponse),
        (status = 401, description = "Not authenticated", body = AuthFailurePayload),
        (status = 403, description = "Role or permission missing", body = AuthFailurePayload)
    ),
    security(("bearerAuth" = []))
)]
pub async fn seedbed_leader(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<DashboardResponse>> {
    render(&state, auth, "seedbed_leader").await
}
