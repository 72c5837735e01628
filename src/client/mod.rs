//! Client-side permission evaluation over the session snapshot.
//!
//! Everything here is advisory. It decides what the UI shows (gated widgets,
//! navigation entries) from the [`SessionPermissionSnapshot`] the server handed
//! out at login or session validation. It never grants access: every mutating or
//! disclosing route is independently guarded on the server by
//! [`crate::authz::RoleGate`] and [`crate::authz::PermissionGuard`].
//!
//! All types are synchronous and pure so they can be re-run on every render.

mod evaluator;
mod gate;
mod navigation;
mod snapshot;

pub use evaluator::{PermissionEvaluator, PredicateSpec};
pub use gate::{GateOutcome, PermissionGate};
pub use navigation::{event_app_menu, MenuGroup, MenuItem, NavGroup, NavItem, NavigationComposer, WorkContext};
pub use snapshot::{SessionPermissionSnapshot, SessionState, SnapshotError};
