use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use super::roles::SIGN_IN_PATH;

/// Machine-readable code carried by every denial payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Absent,
    Invalid,
    Expired,
    IdentityNotFound,
    Unauthenticated,
    InsufficientPermissions,
}

/// Details of a role or permission denial for an authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    /// First role assigned to the identity, if any.
    pub user_role: Option<String>,
    /// Roles that would have been accepted; `None` for permission denials.
    pub required_roles: Option<Vec<String>>,
    /// Permission that was checked; `None` for role denials.
    pub required_permission: Option<String>,
    pub redirect_to: &'static str,
}

impl Denial {
    fn message(&self) -> String {
        match (&self.required_roles, &self.required_permission) {
            (_, Some(permission)) => format!("missing required permission '{permission}'"),
            (Some(roles), None) => format!("requires one of the roles: {}", roles.join(", ")),
            (None, None) => "insufficient permissions".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthFailure {
    #[error("authentication token is missing")]
    TokenAbsent,
    #[error("authentication token is invalid")]
    TokenInvalid,
    #[error("authentication token has expired")]
    TokenExpired,
    #[error("the account behind this token no longer exists")]
    IdentityNotFound,
    #[error("authentication is required")]
    Unauthenticated,
    #[error("{}", .0.message())]
    InsufficientPermissions(Box<Denial>),
}

impl AuthFailure {
    pub fn insufficient(denial: Denial) -> Self {
        Self::InsufficientPermissions(Box::new(denial))
    }

    pub fn error_code(&self) -> ErrorCode {
        match self {
            AuthFailure::TokenAbsent => ErrorCode::Absent,
            AuthFailure::TokenInvalid => ErrorCode::Invalid,
            AuthFailure::TokenExpired => ErrorCode::Expired,
            AuthFailure::IdentityNotFound => ErrorCode::IdentityNotFound,
            AuthFailure::Unauthenticated => ErrorCode::Unauthenticated,
            AuthFailure::InsufficientPermissions(_) => ErrorCode::InsufficientPermissions,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthFailure::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    pub fn redirect_to(&self) -> &'static str {
        match self {
            AuthFailure::InsufficientPermissions(denial) => denial.redirect_to,
            _ => SIGN_IN_PATH,
        }
    }

    pub fn payload(&self) -> AuthFailurePayload {
        let (required_roles, user_role) = match self {
            AuthFailure::InsufficientPermissions(denial) => {
                (denial.required_roles.clone(), Some(denial.user_role.clone()))
            }
            _ => (None, None),
        };

        AuthFailurePayload {
            success: false,
            message: self.to_string(),
            error_code: self.error_code(),
            redirect_to: self.redirect_to().to_string(),
            required_roles,
            user_role,
        }
    }
}

/// Body returned for every authentication or authorization denial.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthFailurePayload {
    pub success: bool,
    pub message: String,
    pub error_code: ErrorCode,
    #[schema(example = "/sign-in")]
    pub redirect_to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_roles: Option<Vec<String>>,
    /// Present on role/permission denials; `null` when no role is assigned.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub user_role: Option<Option<String>>,
}

impl IntoResponse for AuthFailure {
    fn into_response(self) -> Response {
        tracing::debug!(
            error_code = ?self.error_code(),
            redirect_to = self.redirect_to(),
            "request denied"
        );
        (self.status(), Json(self.payload())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn authentication_failures_are_401_with_sign_in_redirect() {
        let cases = [
            (AuthFailure::TokenAbsent, "ABSENT"),
            (AuthFailure::TokenInvalid, "INVALID"),
            (AuthFailure::TokenExpired, "EXPIRED"),
            (AuthFailure::IdentityNotFound, "IDENTITY_NOT_FOUND"),
            (AuthFailure::Unauthenticated, "UNAUTHENTICATED"),
        ];

        for (failure, code) in cases {
            assert_eq!(failure.status(), StatusCode::UNAUTHORIZED);
            let body = serde_json::to_value(failure.payload()).unwrap();
            assert_eq!(body["success"], json!(false));
            assert_eq!(body["error_code"], json!(code));
            assert_eq!(body["redirect_to"], json!("/sign-in"));
            assert!(body.get("required_roles").is_none());
            assert!(body.get("user_role").is_none());
        }
    }

    #[test]
    fn role_denial_carries_required_roles_and_null_user_role() {
        let failure = AuthFailure::insufficient(Denial {
            user_role: None,
            required_roles: Some(vec!["admin".to_string()]),
            required_permission: None,
            redirect_to: SIGN_IN_PATH,
        });

        assert_eq!(failure.status(), StatusCode::FORBIDDEN);
        let body = serde_json::to_value(failure.payload()).unwrap();
        assert_eq!(body["error_code"], json!("INSUFFICIENT_PERMISSIONS"));
        assert_eq!(body["required_roles"], json!(["admin"]));
        assert_eq!(body["user_role"], json!(null));
        assert_eq!(body["message"], json!("requires one of the roles: admin"));
    }

    #[test]
    fn permission_denial_names_the_permission() {
        let failure = AuthFailure::insufficient(Denial {
            user_role: Some("coordinator".to_string()),
            required_roles: None,
            required_permission: Some("admin.roles.manage".to_string()),
            redirect_to: "/coordinator",
        });

        let body = serde_json::to_value(failure.payload()).unwrap();
        assert_eq!(body["user_role"], json!("coordinator"));
        assert_eq!(body["redirect_to"], json!("/coordinator"));
        assert!(body.get("required_roles").is_none());
        assert_eq!(body["message"], json!("missing required permission 'admin.roles.manage'"));
    }
}
