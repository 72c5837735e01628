//! Authorization core - permission cache, role gate and permission guard
//!
//! This module implements the server-side half of access control:
//! - Per-identity permission cache with TTL and explicit invalidation
//! - Role gate with a total role -> redirect mapping
//! - Permission guard backed by the cache
//! - Structured denial payloads
//!
//! Every route that mutates or discloses protected data sits behind these
//! checks. The client-side evaluator in [`crate::client`] mirrors them for UI
//! purposes only.

mod cache;
mod clock;
mod evaluator;
mod failure;
mod roles;

pub use cache::{PermissionCache, PermissionSet, PermissionSource};
pub use clock::{Clock, ManualClock, SystemClock};
pub use evaluator::{
    require_permission, require_permission_layer, CachedPolicyEvaluator, PermissionGuard, PolicyEvaluator,
};
pub use failure::{AuthFailure, AuthFailurePayload, Denial, ErrorCode};
pub use roles::{require_roles, PrimaryRole, RoleAuthorizer, RoleDecision, RoleGate, SIGN_IN_PATH};

/// Well-known role names
pub mod role_names {
    pub const ADMIN: &str = "admin";
    pub const COORDINATOR: &str = "coordinator";
    pub const SEEDBED_LEADER: &str = "seedbed_leader";
}

/// Well-known permission names
pub mod permission_names {
    // Dashboards
    pub const ADMIN_DASHBOARD_VIEW: &str = "admin.dashboard.view";
    pub const COORDINATOR_DASHBOARD_VIEW: &str = "coordinator.dashboard.view";
    pub const SEEDBED_LEADER_DASHBOARD_VIEW: &str = "seedbed_leader.dashboard.view";

    // Administration
    pub const USERS_VIEW: &str = "admin.users.view";
    pub const USERS_MANAGE: &str = "admin.users.manage";
    pub const ROLES_VIEW: &str = "admin.roles.view";
    pub const ROLES_MANAGE: &str = "admin.roles.manage";

    // Event work
    pub const EVENTS_VIEW: &str = "events.view";
    pub const EVENTS_MANAGE: &str = "events.manage";
    pub const COMMITTEES_VIEW: &str = "committees.view";
    pub const PARTICIPANTS_VIEW: &str = "participants.view";
    pub const TASKS_VIEW: &str = "tasks.view";
    pub const REPORTS_EXPORT: &str = "reports.export";
}
