use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use super::failure::{AuthFailure, Denial};
use crate::errors::AppError;
use crate::models::user::Identity;

pub const SIGN_IN_PATH: &str = "/sign-in";

/// Classification of an identity's first role for redirect purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryRole<'a> {
    Admin,
    Coordinator,
    SeedbedLeader,
    Other(&'a str),
    Unassigned,
}

impl<'a> PrimaryRole<'a> {
    pub fn from_name(name: Option<&'a str>) -> Self {
        match name {
            Some(super::role_names::ADMIN) => PrimaryRole::Admin,
            Some(super::role_names::COORDINATOR) => PrimaryRole::Coordinator,
            Some(super::role_names::SEEDBED_LEADER) => PrimaryRole::SeedbedLeader,
            Some(other) => PrimaryRole::Other(other),
            None => PrimaryRole::Unassigned,
        }
    }

    pub fn of(identity: &'a Identity) -> Self {
        Self::from_name(identity.primary_role())
    }

    /// Where a denied request is sent back to. Total over every role value.
    pub fn redirect_path(self) -> &'static str {
        match self {
            PrimaryRole::Admin => "/admin",
            PrimaryRole::Coordinator => "/coordinator",
            PrimaryRole::SeedbedLeader => "/seedbed-leader",
            PrimaryRole::Other(_) | PrimaryRole::Unassigned => SIGN_IN_PATH,
        }
    }
}

/// Outcome of a role check at the request boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleDecision {
    Allow,
    Deny(Denial),
    /// No identity was established for the request.
    Unauthenticated,
}

impl RoleDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RoleDecision::Allow)
    }

    pub fn into_result(self) -> Result<(), AuthFailure> {
        match self {
            RoleDecision::Allow => Ok(()),
            RoleDecision::Deny(denial) => Err(AuthFailure::insufficient(denial)),
            RoleDecision::Unauthenticated => Err(AuthFailure::Unauthenticated),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RoleAuthorizer;

impl RoleAuthorizer {
    /// Allows when the identity holds at least one of `required_roles`.
    /// An empty `required_roles` never allows.
    pub fn authorize<S: AsRef<str>>(identity: Option<&Identity>, required_roles: &[S]) -> RoleDecision {
        let Some(identity) = identity else {
            return RoleDecision::Unauthenticated;
        };

        if required_roles.iter().any(|role| identity.has_role(role.as_ref())) {
            tracing::debug!(user_id = %identity.id, "role check passed");
            return RoleDecision::Allow;
        }

        let required: Vec<String> = required_roles.iter().map(|r| r.as_ref().to_string()).collect();
        tracing::warn!(
            user_id = %identity.id,
            roles = ?identity.role_names(),
            required = ?required,
            "role check failed"
        );

        RoleDecision::Deny(Denial {
            user_role: identity.primary_role().map(str::to_string),
            required_roles: Some(required),
            required_permission: None,
            redirect_to: PrimaryRole::of(identity).redirect_path(),
        })
    }
}

/// Route-level requirement: at least one of these roles.
#[derive(Debug, Clone)]
pub struct RoleGate {
    roles: Arc<[String]>,
}

impl RoleGate {
    pub fn any_of<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn roles(&self) -> &[String] {
        &self.roles
    }
}

/// Middleware for `axum::middleware::from_fn_with_state`. Reads the identity
/// attached by the authentication layer.
pub async fn require_roles(
    State(gate): State<RoleGate>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    RoleAuthorizer::authorize(req.extensions().get::<Identity>(), gate.roles()).into_result()?;
    Ok(next.run(req).await)
}
