use super::evaluator::PredicateSpec;
use super::snapshot::SessionState;

/// What a gated region renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome<T> {
    /// Session still resolving; show a loading affordance.
    Loading,
    Granted(T),
    Fallback(T),
    /// Render nothing.
    Empty,
}

/// Wraps protected content behind a [`PredicateSpec`].
///
/// Denied access renders the fallback, or nothing when `hide_when_denied` is
/// set or no fallback was supplied. A loading session never renders either the
/// content or the denial.
#[derive(Debug, Clone)]
pub struct PermissionGate<T> {
    predicate: PredicateSpec,
    fallback: Option<T>,
    hide_when_denied: bool,
}

impl<T: Clone> PermissionGate<T> {
    pub fn new(predicate: PredicateSpec) -> Self {
        Self {
            predicate,
            fallback: None,
            hide_when_denied: false,
        }
    }

    pub fn with_fallback(mut self, fallback: T) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn hide_when_denied(mut self, hide: bool) -> Self {
        self.hide_when_denied = hide;
        self
    }

    pub fn predicate(&self) -> &PredicateSpec {
        &self.predicate
    }

    /// `content` is only invoked when access is granted.
    pub fn render(&self, session: &SessionState, content: impl FnOnce() -> T) -> GateOutcome<T> {
        let Some(evaluator) = session.evaluator() else {
            return GateOutcome::Loading;
        };

        if evaluator.evaluate(&self.predicate) {
            return GateOutcome::Granted(content());
        }

        match (&self.fallback, self.hide_when_denied) {
            (Some(fallback), false) => GateOutcome::Fallback(fallback.clone()),
            _ => GateOutcome::Empty,
        }
    }
}
