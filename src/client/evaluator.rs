/// Pure predicates over a snapshot's permission list. Exact string matching
/// only; no wildcards or hierarchy.
#[derive(Debug, Clone, Copy)]
pub struct PermissionEvaluator<'a> {
    permissions: &'a [String],
}

impl<'a> PermissionEvaluator<'a> {
    pub fn new(permissions: &'a [String]) -> Self {
        Self { permissions }
    }

    pub fn has_permission(&self, name: &str) -> bool {
        self.permissions.iter().any(|p| p == name)
    }

    /// At least one of `names`. An empty list places no restriction.
    pub fn has_any<S: AsRef<str>>(&self, names: &[S]) -> bool {
        names.is_empty() || names.iter().any(|n| self.has_permission(n.as_ref()))
    }

    /// Every one of `names`; true for an empty list.
    pub fn has_all<S: AsRef<str>>(&self, names: &[S]) -> bool {
        names.iter().all(|n| self.has_permission(n.as_ref()))
    }

    pub fn evaluate(&self, predicate: &PredicateSpec) -> bool {
        match predicate {
            PredicateSpec::Exact(name) => self.has_permission(name),
            PredicateSpec::Any(names) => self.has_any(names),
            PredicateSpec::All(names) => self.has_all(names),
            PredicateSpec::None => true,
        }
    }
}

/// The single predicate a gate evaluates.
///
/// Callers may supply an exact permission, an any-of list and an all-of list at
/// once; only the highest-precedence one present is kept (exact, then any,
/// then all). The others are discarded, not combined.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PredicateSpec {
    Exact(String),
    Any(Vec<String>),
    All(Vec<String>),
    #[default]
    None,
}

impl PredicateSpec {
    pub fn from_props(
        permission: Option<String>,
        any_permissions: Option<Vec<String>>,
        all_permissions: Option<Vec<String>>,
    ) -> Self {
        match (permission, any_permissions, all_permissions) {
            (Some(name), _, _) => PredicateSpec::Exact(name),
            (None, Some(names), _) => PredicateSpec::Any(names),
            (None, None, Some(names)) => PredicateSpec::All(names),
            (None, None, None) => PredicateSpec::None,
        }
    }
}
