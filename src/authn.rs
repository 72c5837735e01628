//! Bearer-token authentication.
//!
//! Turns an `Authorization: Bearer <jwt>` header into an [`Identity`] or one of
//! the typed failures `TokenAbsent`, `TokenInvalid`, `TokenExpired`,
//! `IdentityNotFound`. Anything unexpected while verifying is `TokenInvalid`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::AuthFailure;
use crate::errors::AppError;
use crate::jwt::JwtConfig;
use crate::models::user::Identity;

/// Lookup of the principal named by a token's subject.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// `Ok(None)` when the user does not exist or was deleted.
    async fn find_identity(&self, id: Uuid) -> Result<Option<Identity>, AppError>;
}

/// Pulls the bearer credential out of the request headers.
pub fn extract_bearer(headers: &HeaderMap) -> Result<&str, AuthFailure> {
    let Some(value) = headers.get(axum::http::header::AUTHORIZATION) else {
        return Err(AuthFailure::TokenAbsent);
    };

    let value = value.to_str().map_err(|_| AuthFailure::TokenInvalid)?;
    let token = value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or(AuthFailure::TokenAbsent)?;

    if token.is_empty() {
        return Err(AuthFailure::TokenAbsent);
    }

    Ok(token)
}

#[derive(Clone)]
pub struct TokenAuthenticator {
    jwt: Arc<JwtConfig>,
    identities: Arc<dyn IdentityStore>,
    lookup_timeout: Duration,
}

impl TokenAuthenticator {
    pub fn new(jwt: Arc<JwtConfig>, identities: Arc<dyn IdentityStore>, lookup_timeout: Duration) -> Self {
        Self {
            jwt,
            identities,
            lookup_timeout,
        }
    }

    pub async fn authenticate(&self, token: &str) -> Result<Identity, AuthFailure> {
        let claims = self.jwt.decode(token)?;

        match tokio::time::timeout(self.lookup_timeout, self.identities.find_identity(claims.sub)).await {
            Ok(Ok(Some(identity))) => {
                tracing::debug!(user_id = %identity.id, roles = ?identity.role_names(), "authenticated");
                Ok(identity)
            }
            Ok(Ok(None)) => {
                tracing::debug!(user_id = %claims.sub, "token subject not found");
                Err(AuthFailure::IdentityNotFound)
            }
            Ok(Err(err)) => {
                tracing::warn!(user_id = %claims.sub, error = %err, "identity lookup failed");
                Err(AuthFailure::TokenInvalid)
            }
            Err(_) => {
                tracing::warn!(user_id = %claims.sub, "identity lookup timed out");
                Err(AuthFailure::TokenInvalid)
            }
        }
    }

    pub async fn authenticate_headers(&self, headers: &HeaderMap) -> Result<Identity, AuthFailure> {
        let token = extract_bearer(headers)?;
        self.authenticate(token).await
    }
}

/// Middleware that authenticates the request and attaches the [`Identity`]
/// to its extensions for the gates and handlers behind it.
pub async fn require_authentication(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = state.authenticator.authenticate_headers(req.headers()).await?;
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// Extractor for the authenticated identity. Reuses the one attached by
/// [`require_authentication`] and authenticates on its own otherwise.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub identity: Identity,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(identity) = parts.extensions.get::<Identity>() {
            return Ok(AuthUser {
                identity: identity.clone(),
            });
        }

        let identity = state.authenticator.authenticate_headers(&parts.headers).await?;
        parts.extensions.insert(identity.clone());
        Ok(AuthUser { identity })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::rbac::RoleRef;
    use axum::http::HeaderValue;
    use chrono::Utc;

    enum Store {
        Known(Identity),
        Empty,
        Broken,
        Stalled,
    }

    #[async_trait]
    impl IdentityStore for Store {
        async fn find_identity(&self, id: Uuid) -> Result<Option<Identity>, AppError> {
            match self {
                Store::Known(identity) if identity.id == id => Ok(Some(identity.clone())),
                Store::Known(_) | Store::Empty => Ok(None),
                Store::Broken => Err(AppError::internal("connection reset")),
                Store::Stalled => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(None)
                }
            }
        }
    }

    fn jwt() -> Arc<JwtConfig> {
        Arc::new(JwtConfig::new("test-secret", 1))
    }

    fn ada() -> Identity {
        Identity {
            id: Uuid::new_v4(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            roles: vec![RoleRef {
                name: "admin".to_string(),
                display_name: "Administrator".to_string(),
            }],
        }
    }

    fn authenticator(store: Store) -> TokenAuthenticator {
        TokenAuthenticator::new(jwt(), Arc::new(store), Duration::from_millis(50))
    }

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn bearer_extraction() {
        assert_eq!(extract_bearer(&headers("Bearer abc.def")).unwrap(), "abc.def");
        assert_eq!(extract_bearer(&HeaderMap::new()), Err(AuthFailure::TokenAbsent));
        assert_eq!(extract_bearer(&headers("Bearer   ")), Err(AuthFailure::TokenAbsent));
        assert_eq!(extract_bearer(&headers("Basic dXNlcjpwdw==")), Err(AuthFailure::TokenAbsent));

        let mut opaque = HeaderMap::new();
        opaque.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_bytes(b"Bearer \xfftoken").unwrap(),
        );
        assert_eq!(extract_bearer(&opaque), Err(AuthFailure::TokenInvalid));
    }

    #[tokio::test]
    async fn valid_token_resolves_identity() {
        let identity = ada();
        let token = jwt().encode(identity.id).unwrap();
        let resolved = authenticator(Store::Known(identity.clone()))
            .authenticate_headers(&headers(&format!("Bearer {token}")))
            .await
            .unwrap();
        assert_eq!(resolved, identity);
    }

    #[tokio::test]
    async fn expired_token_is_expired() {
        let token = jwt()
            .encode_at(Uuid::new_v4(), Utc::now() - chrono::Duration::hours(5))
            .unwrap();
        let err = authenticator(Store::Empty).authenticate(&token).await.unwrap_err();
        assert_eq!(err, AuthFailure::TokenExpired);
    }

    #[tokio::test]
    async fn tampered_token_is_invalid() {
        let mut token = jwt().encode(Uuid::new_v4()).unwrap();
        token.push('x');
        let err = authenticator(Store::Empty).authenticate(&token).await.unwrap_err();
        assert_eq!(err, AuthFailure::TokenInvalid);
    }

    #[tokio::test]
    async fn unknown_subject_is_identity_not_found() {
        let token = jwt().encode(Uuid::new_v4()).unwrap();
        let err = authenticator(Store::Known(ada())).authenticate(&token).await.unwrap_err();
        assert_eq!(err, AuthFailure::IdentityNotFound);
    }

    #[tokio::test]
    async fn store_errors_fail_closed() {
        let token = jwt().encode(Uuid::new_v4()).unwrap();
        assert_eq!(
            authenticator(Store::Broken).authenticate(&token).await.unwrap_err(),
            AuthFailure::TokenInvalid
        );
        assert_eq!(
            authenticator(Store::Stalled).authenticate(&token).await.unwrap_err(),
            AuthFailure::TokenInvalid
        );
    }
}
