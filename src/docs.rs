use axum::{routing::get, Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::openapi::server::Server;
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::authz::{AuthFailurePayload, ErrorCode};
use crate::client::{MenuGroup, MenuItem, SessionPermissionSnapshot};
use crate::config::ServerConfig;
use crate::models;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
	paths(
		routes::auth::login,
		routes::auth::session,
		routes::auth::navigation,
		routes::auth::logout,
		routes::dashboard::admin,
		routes::dashboard::coordinator,
		routes::dashboard::seedbed_leader,
		routes::rbac::list_roles,
		routes::rbac::list_permissions,
		routes::rbac::replace_role_permissions,
		routes::rbac::assign_permission_to_role,
		routes::rbac::revoke_permission_from_role,
		routes::rbac::get_user_roles,
		routes::rbac::assign_role_to_user,
		routes::rbac::revoke_role_from_user,
		routes::rbac::get_effective_permissions,
		routes::rbac::flush_permission_cache,
		routes::health::health
	),
	components(
		schemas(
			models::user::LoginRequest,
			models::user::AuthResponse,
			models::rbac::RoleRef,
			models::rbac::Role,
			models::rbac::RoleDefinition,
			models::rbac::ReplaceRolePermissionsRequest,
			models::rbac::Permission,
			models::rbac::RolePermission,
			models::rbac::AssignPermissionRequest,
			models::rbac::UserRole,
			models::rbac::AssignRoleRequest,
			models::rbac::EffectivePermissions,
			SessionPermissionSnapshot,
			MenuGroup,
			MenuItem,
			AuthFailurePayload,
			ErrorCode,
			routes::auth::MessageResponse,
			routes::dashboard::DashboardResponse,
			routes::health::HealthResponse
		)
	),
	modifiers(&SecurityAddon),
	tags(
		(name = "Auth", description = "Sign-in and session validation"),
		(name = "Dashboards", description = "Role home pages"),
		(name = "RBAC", description = "Role and permission administration"),
		(name = "Health", description = "Liveness")
	)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
	fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
		let components = openapi.components.get_or_insert_with(Default::default);
		components.add_security_scheme(
			"bearerAuth",
			SecurityScheme::Http(
				HttpBuilder::new()
					.scheme(HttpAuthScheme::Bearer)
					.bearer_format("JWT")
					.build(),
			),
		);
	}
}

pub fn build_openapi(server: &ServerConfig) -> utoipa::openapi::OpenApi {
	let mut doc = ApiDoc::openapi();

	let scheme = if server.tls.is_some() { "https" } else { "http" };
	doc.servers = Some(vec![Server::new(format!("{}://localhost:{}", scheme, server.port))]);

	doc
}

/// Swagger UI at `/docs`, fetching the document from `/api-docs/openapi.json`.
pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> anyhow::Result<Router> {
	let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
		.try_it_out_enabled(true)
		.with_credentials(true)
		.persist_authorization(true);

	let doc_json = serde_json::to_value(&doc)?;

	Ok(Router::new()
		.route(
			"/api-docs/openapi.json",
			get(move || {
				let doc_json = doc_json.clone();
				async move { Json(doc_json) }
			}),
		)
		.merge(SwaggerUi::new("/docs").config(swagger_config)))
}
