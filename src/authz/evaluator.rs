use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use super::cache::PermissionCache;
use super::failure::{AuthFailure, Denial};
use super::roles::PrimaryRole;
use crate::errors::AppError;
use crate::models::user::Identity;

/// Server-side permission decision. This is the authoritative check; whatever
/// the client's snapshot claims is never consulted.
#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    /// Check if the identity currently holds the permission
    async fn can(&self, identity: &Identity, permission: &str) -> bool;
}

/// Evaluates against the identity's cached flattened permission set.
///
/// Evaluation order:
/// 1. resolve the set through the cache (recomputed past TTL, empty on store failure)
/// 2. exact-string membership
/// 3. deny
#[derive(Debug, Clone)]
pub struct CachedPolicyEvaluator {
    cache: PermissionCache,
}

impl CachedPolicyEvaluator {
    pub fn new(cache: PermissionCache) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl PolicyEvaluator for CachedPolicyEvaluator {
    async fn can(&self, identity: &Identity, permission: &str) -> bool {
        let granted = self.cache.resolve(identity.id).await;

        if granted.contains(permission) {
            tracing::debug!(
                user_id = %identity.id,
                permission = %permission,
                "permission match"
            );
            return true;
        }

        tracing::debug!(
            user_id = %identity.id,
            permission = %permission,
            "permission denied"
        );
        false
    }
}

/// Fails with `InsufficientPermissions` unless the evaluator grants `permission`.
pub async fn require_permission(
    evaluator: &dyn PolicyEvaluator,
    identity: &Identity,
    permission: &str,
) -> Result<(), AuthFailure> {
    if evaluator.can(identity, permission).await {
        return Ok(());
    }

    tracing::warn!(user_id = %identity.id, permission = %permission, "permission check failed");
    Err(AuthFailure::insufficient(Denial {
        user_role: identity.primary_role().map(str::to_string),
        required_roles: None,
        required_permission: Some(permission.to_string()),
        redirect_to: PrimaryRole::of(identity).redirect_path(),
    }))
}

/// Route-level requirement of a single permission.
#[derive(Clone)]
pub struct PermissionGuard {
    evaluator: Arc<dyn PolicyEvaluator>,
    permission: Arc<str>,
}

impl PermissionGuard {
    pub fn new(evaluator: Arc<dyn PolicyEvaluator>, permission: &str) -> Self {
        Self {
            evaluator,
            permission: Arc::from(permission),
        }
    }

    pub fn permission(&self) -> &str {
        &self.permission
    }
}

/// Middleware for `axum::middleware::from_fn_with_state`.
pub async fn require_permission_layer(
    State(guard): State<PermissionGuard>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = req
        .extensions()
        .get::<Identity>()
        .cloned()
        .ok_or(AuthFailure::Unauthenticated)?;

    require_permission(guard.evaluator.as_ref(), &identity, guard.permission()).await?;
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::cache::PermissionSource;
    use crate::authz::clock::SystemClock;
    use crate::models::rbac::RoleRef;
    use std::collections::BTreeSet;
    use std::time::Duration as StdDuration;
    use uuid::Uuid;

    struct OneGrant(&'static str);

    #[async_trait]
    impl PermissionSource for OneGrant {
        async fn load_permissions(&self, _identity_id: Uuid) -> Result<BTreeSet<String>, AppError> {
            Ok(BTreeSet::from([self.0.to_string()]))
        }
    }

    struct Offline;

    #[async_trait]
    impl PermissionSource for Offline {
        async fn load_permissions(&self, _identity_id: Uuid) -> Result<BTreeSet<String>, AppError> {
            Err(AppError::internal("database unavailable"))
        }
    }

    fn evaluator(source: impl PermissionSource + 'static) -> CachedPolicyEvaluator {
        CachedPolicyEvaluator::new(PermissionCache::new(
            Arc::new(source),
            Arc::new(SystemClock),
            chrono::Duration::seconds(3600),
            StdDuration::from_secs(1),
        ))
    }

    fn coordinator() -> Identity {
        Identity {
            id: Uuid::new_v4(),
            name: "Coord".to_string(),
            email: "coord@example.com".to_string(),
            roles: vec![RoleRef {
                name: "coordinator".to_string(),
                display_name: "Coordinator".to_string(),
            }],
        }
    }

    #[tokio::test]
    async fn exact_match_only() {
        let evaluator = evaluator(OneGrant("admin.users.view"));
        let identity = coordinator();

        assert!(evaluator.can(&identity, "admin.users.view").await);
        assert!(!evaluator.can(&identity, "admin.users").await);
        assert!(!evaluator.can(&identity, "admin.users.view.all").await);
        assert!(!evaluator.can(&identity, "admin.*").await);
    }

    #[tokio::test]
    async fn denial_redirects_to_primary_role_home() {
        let evaluator = evaluator(OneGrant("events.view"));
        let identity = coordinator();

        let err = require_permission(&evaluator, &identity, "admin.roles.manage")
            .await
            .unwrap_err();
        match err {
            AuthFailure::InsufficientPermissions(denial) => {
                assert_eq!(denial.redirect_to, "/coordinator");
                assert_eq!(denial.required_permission.as_deref(), Some("admin.roles.manage"));
            }
            other => panic!("unexpected failure {other:?}"),
        }
    }

    #[tokio::test]
    async fn store_outage_denies() {
        let evaluator = evaluator(Offline);
        assert!(require_permission(&evaluator, &coordinator(), "events.view").await.is_err());
    }
}
