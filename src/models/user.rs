use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::client::SessionPermissionSnapshot;
use crate::models::rbac::RoleRef;

/// Authenticated principal resolved from a bearer token.
///
/// Roles keep assignment order; the first one is the primary role used for
/// redirect decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Identity {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub roles: Vec<RoleRef>,
}

impl Identity {
    pub fn primary_role(&self) -> Option<&str> {
        self.roles.first().map(|role| role.name.as_str())
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.name == role)
    }

    pub fn role_names(&self) -> Vec<String> {
        self.roles.iter().map(|r| r.name.clone()).collect()
    }
}

impl crate::events::Loggable for Identity {
    fn entity_type() -> &'static str { "user" }
    fn subject_id(&self) -> String { self.id.to_string() }
}

#[derive(Debug, Clone)]
pub struct DbUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl DbUser {
    pub fn into_identity(self, roles: Vec<RoleRef>) -> Identity {
        Identity {
            id: self.id,
            name: self.name,
            email: self.email,
            roles,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "ada@example.com")]
    pub email: String,
    #[schema(example = "S3cureP@ssw0rd")]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub user: SessionPermissionSnapshot,
}
