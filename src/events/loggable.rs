use serde::{Deserialize, Serialize};

/// Severity levels for activity logs.
/// Controls retention policies and log filtering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Access-control changes: long-term retention, never auto-delete
    Critical,
    /// Default retention
    #[default]
    Important,
    /// Aggressively trimmed (e.g., 7 days)
    Noise,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Important => "important",
            Severity::Noise => "noise",
        }
    }
}

/// Trait for entities that can be logged in the activity log.
pub trait Loggable: Serialize + Send + Sync {
    /// Prefix of event names, e.g. "user_role" in "user_role.assigned"
    fn entity_type() -> &'static str;

    /// Key of the subject: a user id or a role name
    fn subject_id(&self) -> String;

    fn severity(&self) -> Severity {
        Severity::Important
    }

    /// Override severity based on action (e.g., "revoked" -> Critical)
    fn severity_for_action(&self, action: &str) -> Severity {
        match action {
            "deleted" | "revoked" => Severity::Critical,
            _ => self.severity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Probe;

    impl Loggable for Probe {
        fn entity_type() -> &'static str {
            "probe"
        }

        fn subject_id(&self) -> String {
            "probe-1".to_string()
        }
    }

    #[test]
    fn revocations_escalate_to_critical() {
        assert_eq!(Probe.severity_for_action("revoked"), Severity::Critical);
        assert_eq!(Probe.severity_for_action("assigned"), Severity::Important);
        assert_eq!(Severity::Critical.as_str(), "critical");
    }
}
