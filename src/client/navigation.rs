use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::evaluator::PermissionEvaluator;
use super::snapshot::SessionState;
use crate::authz::permission_names as perms;

type VisibilityCheck = Arc<dyn Fn() -> bool + Send + Sync>;

/// Menu entry definition.
#[derive(Clone)]
pub struct NavItem {
    pub label: String,
    pub href: String,
    pub permission: Option<String>,
    is_visible: Option<VisibilityCheck>,
}

impl NavItem {
    pub fn new(label: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            href: href.into(),
            permission: None,
            is_visible: None,
        }
    }

    pub fn requires(mut self, permission: &str) -> Self {
        self.permission = Some(permission.to_string());
        self
    }

    /// Contextual condition evaluated at compose time, e.g. "an event is selected".
    pub fn visible_when(mut self, check: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.is_visible = Some(Arc::new(check));
        self
    }

    fn included(&self, evaluator: &PermissionEvaluator<'_>) -> bool {
        let permitted = self
            .permission
            .as_deref()
            .map_or(true, |permission| evaluator.has_permission(permission));
        permitted && self.is_visible.as_ref().map_or(true, |check| check())
    }
}

impl fmt::Debug for NavItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavItem")
            .field("label", &self.label)
            .field("href", &self.href)
            .field("permission", &self.permission)
            .field("contextual", &self.is_visible.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct NavGroup {
    pub label: String,
    pub items: Vec<NavItem>,
}

impl NavGroup {
    pub fn new(label: impl Into<String>, items: Vec<NavItem>) -> Self {
        Self {
            label: label.into(),
            items,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct MenuItem {
    #[schema(example = "Dashboard")]
    pub label: String,
    #[schema(example = "/coordinator")]
    pub href: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct MenuGroup {
    pub label: String,
    pub items: Vec<MenuItem>,
}

/// Filters a menu definition down to what a session may see.
///
/// Items sharing a position (several role-specific dashboards) are not assumed
/// to be mutually exclusive; every one that passes is rendered.
#[derive(Debug, Clone, Default)]
pub struct NavigationComposer {
    groups: Vec<NavGroup>,
}

impl NavigationComposer {
    pub fn new(groups: Vec<NavGroup>) -> Self {
        Self { groups }
    }

    pub fn compose(&self, evaluator: &PermissionEvaluator<'_>) -> Vec<MenuGroup> {
        self.groups
            .iter()
            .filter_map(|group| {
                let items: Vec<MenuItem> = group
                    .items
                    .iter()
                    .filter(|item| item.included(evaluator))
                    .map(|item| MenuItem {
                        label: item.label.clone(),
                        href: item.href.clone(),
                    })
                    .collect();

                (!items.is_empty()).then(|| MenuGroup {
                    label: group.label.clone(),
                    items,
                })
            })
            .collect()
    }

    /// Empty while the session is still loading.
    pub fn compose_for(&self, session: &SessionState) -> Vec<MenuGroup> {
        session
            .evaluator()
            .map(|evaluator| self.compose(&evaluator))
            .unwrap_or_default()
    }
}

/// Contextual state the menu depends on besides permissions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkContext {
    pub selected_event: Option<Uuid>,
}

/// Main menu of the event app.
pub fn event_app_menu(ctx: WorkContext) -> NavigationComposer {
    let selected = ctx.selected_event;
    let event_href = |section: &str| match selected {
        Some(id) => format!("/events/{id}/{section}"),
        None => "/events".to_string(),
    };
    let event_selected = move || selected.is_some();

    NavigationComposer::new(vec![
        NavGroup::new(
            "Overview",
            vec![
                NavItem::new("Dashboard", "/admin").requires(perms::ADMIN_DASHBOARD_VIEW),
                NavItem::new("Dashboard", "/coordinator").requires(perms::COORDINATOR_DASHBOARD_VIEW),
                NavItem::new("Dashboard", "/seedbed-leader").requires(perms::SEEDBED_LEADER_DASHBOARD_VIEW),
            ],
        ),
        NavGroup::new(
            "Events",
            vec![
                NavItem::new("Events", "/events").requires(perms::EVENTS_VIEW),
                NavItem::new("Committees", event_href("committees"))
                    .requires(perms::COMMITTEES_VIEW)
                    .visible_when(event_selected),
                NavItem::new("Participants", event_href("participants"))
                    .requires(perms::PARTICIPANTS_VIEW)
                    .visible_when(event_selected),
                NavItem::new("Tasks", event_href("tasks"))
                    .requires(perms::TASKS_VIEW)
                    .visible_when(event_selected),
                NavItem::new("Reports", event_href("reports"))
                    .requires(perms::REPORTS_EXPORT)
                    .visible_when(event_selected),
            ],
        ),
        NavGroup::new(
            "Administration",
            vec![
                NavItem::new("Users", "/admin/users").requires(perms::USERS_VIEW),
                NavItem::new("Roles & permissions", "/admin/roles").requires(perms::ROLES_VIEW),
            ],
        ),
        NavGroup::new("Account", vec![NavItem::new("Profile", "/profile")]),
    ])
}
