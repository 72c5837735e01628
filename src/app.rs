use std::sync::Arc;

use axum::http::Method;
use axum::middleware;
use axum::routing::{get, post, MethodRouter};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authn::{require_authentication, TokenAuthenticator};
use crate::authz::{
    permission_names as perms, require_permission_layer, require_roles, role_names as roles, CachedPolicyEvaluator,
    Clock, PermissionCache, PermissionGuard, PolicyEvaluator, RoleGate, SystemClock,
};
use crate::config::AuthConfig;
use crate::db::SqliteDirectory;
use crate::errors::AppError;
use crate::events::{init_event_bus, start_activity_listener, EventBus};
use crate::jwt::JwtConfig;
use crate::routes::{auth, dashboard, health, rbac};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub directory: SqliteDirectory,
    pub authenticator: TokenAuthenticator,
    pub permissions: PermissionCache,
    pub policy: Arc<dyn PolicyEvaluator>,
    pub event_bus: EventBus,
}

impl AppState {
    pub fn new(
        pool: SqlitePool,
        jwt: JwtConfig,
        config: AuthConfig,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
    ) -> Self {
        let jwt = Arc::new(jwt);
        let directory = SqliteDirectory::new(pool.clone());

        let authenticator =
            TokenAuthenticator::new(Arc::clone(&jwt), Arc::new(directory.clone()), config.store_timeout);
        let permissions = PermissionCache::new(
            Arc::new(directory.clone()),
            clock,
            config.permission_ttl,
            config.store_timeout,
        );
        let policy: Arc<dyn PolicyEvaluator> = Arc::new(CachedPolicyEvaluator::new(permissions.clone()));

        Self {
            pool,
            jwt,
            directory,
            authenticator,
            permissions,
            policy,
            event_bus,
        }
    }

    /// Role gate plus server-side permission guard for one route.
    ///
    /// Layers run outermost first: authentication (applied router-wide), then
    /// the role gate, then the permission guard.
    pub fn guarded(&self, route: MethodRouter<AppState>, allowed_roles: &[&str], permission: &str) -> MethodRouter<AppState> {
        route
            .route_layer(middleware::from_fn_with_state(
                PermissionGuard::new(Arc::clone(&self.policy), permission),
                require_permission_layer,
            ))
            .route_layer(middleware::from_fn_with_state(
                RoleGate::any_of(allowed_roles.iter().copied()),
                require_roles,
            ))
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let auth_config = AuthConfig::from_env()?;

    let (event_bus, rx) = init_event_bus();
    tokio::spawn(start_activity_listener(rx, pool.clone()));

    let state = AppState::new(pool, jwt_config, auth_config, Arc::new(SystemClock), event_bus);
    Ok(router(state))
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let public = Router::new()
        .route("/auth/login", post(auth::login))
        .route("/api/health", get(health::health));

    let dashboards = Router::new()
        .route(
            "/admin",
            state.guarded(get(dashboard::admin), &[roles::ADMIN], perms::ADMIN_DASHBOARD_VIEW),
        )
        .route(
            "/coordinator",
            state.guarded(get(dashboard::coordinator), &[roles::COORDINATOR], perms::COORDINATOR_DASHBOARD_VIEW),
        )
        .route(
            "/seedbed-leader",
            state.guarded(
                get(dashboard::seedbed_leader),
                &[roles::SEEDBED_LEADER],
                perms::SEEDBED_LEADER_DASHBOARD_VIEW,
            ),
        );

    let protected = Router::new()
        .route("/auth/session", get(auth::session))
        .route("/auth/navigation", get(auth::navigation))
        .route("/auth/logout", post(auth::logout))
        .nest("/dashboard", dashboards)
        .nest("/rbac", rbac::routes(&state))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_authentication));

    Router::new()
        .merge(public)
        .merge(protected)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
