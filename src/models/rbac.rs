use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::events::{Loggable, Severity};

// =============================================================================
// ROLE
// =============================================================================

/// Role reference as carried on an identity and in the session snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RoleRef {
    #[schema(example = "coordinator")]
    pub name: String,
    #[schema(example = "Coordinator")]
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Role {
    pub name: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Permission names this role grants, sorted
    pub permissions: Vec<String>,
}

/// A role's full permission set after it was redefined.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoleDefinition {
    pub role: String,
    pub permissions: Vec<String>,
}

impl Loggable for RoleDefinition {
    fn entity_type() -> &'static str { "role" }
    fn subject_id(&self) -> String { self.role.clone() }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReplaceRolePermissionsRequest {
    #[schema(example = json!(["events.view", "tasks.view"]))]
    pub permissions: Vec<String>,
}

// =============================================================================
// PERMISSION
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Permission {
    #[schema(example = "admin.users.view")]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// =============================================================================
// ROLE-PERMISSION ASSIGNMENT
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RolePermission {
    pub role: String,
    pub permission: String,
}

impl Loggable for RolePermission {
    fn entity_type() -> &'static str { "role_permission" }
    fn subject_id(&self) -> String { self.role.clone() }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignPermissionRequest {
    #[schema(example = "reports.export")]
    pub permission: String,
}

// =============================================================================
// USER-ROLE ASSIGNMENT
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserRole {
    pub user_id: Uuid,
    pub role: String,
    pub changed_at: DateTime<Utc>,
}

impl Loggable for UserRole {
    fn entity_type() -> &'static str { "user_role" }
    fn subject_id(&self) -> String { self.user_id.to_string() }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignRoleRequest {
    #[schema(example = "seedbed_leader")]
    pub role: String,
}

// =============================================================================
// EFFECTIVE PERMISSIONS (resolved through the permission cache)
// =============================================================================

#[derive(Debug, Serialize, ToSchema)]
pub struct EffectivePermissions {
    pub user_id: Uuid,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

/// Marker logged when every cached permission set is dropped.
#[derive(Debug, Serialize)]
pub struct PermissionCacheFlush {
    pub reason: &'static str,
}

impl Loggable for PermissionCacheFlush {
    fn entity_type() -> &'static str { "permission_cache" }
    fn subject_id(&self) -> String { "*".to_string() }
    fn severity(&self) -> Severity { Severity::Critical }
}
