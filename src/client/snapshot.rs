use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::evaluator::PermissionEvaluator;
use crate::authz::PermissionSet;
use crate::models::rbac::RoleRef;
use crate::models::user::Identity;

/// Immutable copy of an identity's permission data, delivered on login and on
/// session validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SessionPermissionSnapshot {
    pub id: Uuid,
    #[schema(example = "Ada Lovelace")]
    pub name: String,
    #[schema(example = "ada@example.com")]
    pub email: String,
    /// Assignment order; the first entry is the primary role
    pub roles: Vec<RoleRef>,
    /// Flattened, sorted permission names
    #[schema(example = json!(["events.view", "tasks.view"]))]
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid session snapshot at `{path}`: {message}")]
pub struct SnapshotError {
    pub path: String,
    pub message: String,
}

impl SessionPermissionSnapshot {
    pub fn from_identity(identity: &Identity, permissions: &PermissionSet) -> Self {
        Self {
            id: identity.id,
            name: identity.name.clone(),
            email: identity.email.clone(),
            roles: identity.roles.clone(),
            permissions: permissions.to_vec(),
        }
    }

    /// Decodes a snapshot as received from the session endpoint, reporting
    /// the path of the first offending field.
    pub fn from_json(raw: &str) -> Result<Self, SnapshotError> {
        let de = &mut serde_json::Deserializer::from_str(raw);
        serde_path_to_error::deserialize(de).map_err(|err| SnapshotError {
            path: err.path().to_string(),
            message: err.inner().to_string(),
        })
    }

    pub fn primary_role(&self) -> Option<&str> {
        self.roles.first().map(|role| role.name.as_str())
    }

    pub fn evaluator(&self) -> PermissionEvaluator<'_> {
        PermissionEvaluator::new(&self.permissions)
    }
}

/// Client view of the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    /// Session validation is still in flight.
    #[default]
    Loading,
    /// Settled without a user.
    Anonymous,
    Ready(SessionPermissionSnapshot),
}

impl SessionState {
    pub fn is_loading(&self) -> bool {
        matches!(self, SessionState::Loading)
    }

    pub fn snapshot(&self) -> Option<&SessionPermissionSnapshot> {
        match self {
            SessionState::Ready(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    /// Evaluator for a settled session; `None` while loading. An anonymous
    /// session evaluates against no permissions.
    pub fn evaluator(&self) -> Option<PermissionEvaluator<'_>> {
        match self {
            SessionState::Loading => None,
            SessionState::Anonymous => Some(PermissionEvaluator::new(&[])),
            SessionState::Ready(snapshot) => Some(snapshot.evaluator()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_session_payload() {
        let raw = r#"{
            "id": "6f1f8a3e-1f7a-4c2a-9d59-0c0d7c1f5b11",
            "name": "Ada",
            "email": "ada@example.com",
            "roles": [{"name": "coordinator", "display_name": "Coordinator"}],
            "permissions": ["events.view", "tasks.view"]
        }"#;

        let snapshot = SessionPermissionSnapshot::from_json(raw).unwrap();
        assert_eq!(snapshot.primary_role(), Some("coordinator"));
        assert!(snapshot.evaluator().has_permission("tasks.view"));
    }

    #[test]
    fn decode_errors_name_the_field() {
        let raw = r#"{
            "id": "6f1f8a3e-1f7a-4c2a-9d59-0c0d7c1f5b11",
            "name": "Ada",
            "email": "ada@example.com",
            "roles": [{"name": "coordinator"}],
            "permissions": []
        }"#;

        let err = SessionPermissionSnapshot::from_json(raw).unwrap_err();
        assert_eq!(err.path, "roles[0]");
        assert!(err.message.contains("display_name"));
    }

    #[test]
    fn anonymous_session_has_no_permissions() {
        assert!(SessionState::Loading.evaluator().is_none());
        let anonymous = SessionState::Anonymous;
        let evaluator = anonymous.evaluator().unwrap();
        assert!(!evaluator.has_permission("events.view"));
        assert!(evaluator.has_any::<&str>(&[]));
    }
}
