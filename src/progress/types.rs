use serde::{Deserialize, Serialize};

use crate::util::time::parse_timestamp_opt;

/// Named phases of one backend collection run, in execution order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKey {
    Login,
    Navigate,
    BaseFilters,
    Chance,
    Ruleta,
    DataReady,
    GenerateAlerts,
    Complete,
}

impl StepKey {
    pub const ORDER: [StepKey; 8] = [
        StepKey::Login,
        StepKey::Navigate,
        StepKey::BaseFilters,
        StepKey::Chance,
        StepKey::Ruleta,
        StepKey::DataReady,
        StepKey::GenerateAlerts,
        StepKey::Complete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepKey::Login => "login",
            StepKey::Navigate => "navigate",
            StepKey::BaseFilters => "base_filters",
            StepKey::Chance => "chance",
            StepKey::Ruleta => "ruleta",
            StepKey::DataReady => "data_ready",
            StepKey::GenerateAlerts => "generate_alerts",
            StepKey::Complete => "complete",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ORDER.iter().copied().find(|k| k.as_str() == key)
    }

    pub fn label(&self) -> &'static str {
        match self {
            StepKey::Login => "Login",
            StepKey::Navigate => "Navigation",
            StepKey::BaseFilters => "Base filters",
            StepKey::Chance => "CHANCE EXPRESS",
            StepKey::Ruleta => "RULETA EXPRESS",
            StepKey::DataReady => "Data ready",
            StepKey::GenerateAlerts => "Generating alerts",
            StepKey::Complete => "Completed",
        }
    }

    /// Expected duration in seconds, used to extrapolate a running step between polls.
    /// `Complete` carries no weight and therefore no estimate.
    pub fn expected_secs(&self) -> Option<f64> {
        match self {
            StepKey::Login => Some(18.0),
            StepKey::Navigate => Some(10.0),
            StepKey::BaseFilters => Some(12.0),
            StepKey::Chance => Some(20.0),
            StepKey::Ruleta => Some(20.0),
            StepKey::DataReady => Some(4.0),
            StepKey::GenerateAlerts => Some(8.0),
            StepKey::Complete => None,
        }
    }

    pub fn is_weighted(&self) -> bool { !matches!(self, StepKey::Complete) }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Success,
    Error,
}

impl StepStatus {
    // Unknown statuses read as pending, like absent steps.
    pub fn parse(s: Option<&str>) -> Self {
        match s {
            Some("running") => StepStatus::Running,
            Some("success") => StepStatus::Success,
            Some("error") => StepStatus::Error,
            _ => StepStatus::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool { matches!(self, StepStatus::Success | StepStatus::Error) }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Success => "success",
            StepStatus::Error => "error",
        }
    }
}

/// A step as reported by the backend's progress feed.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WireStep {
    pub key: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub finished_at: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// One `monitoring/progress` response. Steps are sparse.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct JobProgressSnapshot {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub version: Option<i64>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub finished_at: Option<String>,
    #[serde(default)]
    pub current: Option<String>,
    #[serde(default)]
    pub steps: Vec<WireStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressStep {
    pub key: StepKey,
    pub status: StepStatus,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub error_message: Option<String>,
}

impl JobProgressSnapshot {
    /// Every known step in execution order; anything the feed omitted is `pending`.
    pub fn normalized_steps(&self) -> Vec<ProgressStep> {
        StepKey::ORDER
            .iter()
            .map(|key| {
                match self.steps.iter().find(|s| s.key == key.as_str()) {
                    Some(s) => ProgressStep {
                        key: *key,
                        status: StepStatus::parse(s.status.as_deref()),
                        started_at: parse_timestamp_opt(s.started_at.as_deref()),
                        finished_at: parse_timestamp_opt(s.finished_at.as_deref()),
                        error_message: s.error_message.clone(),
                    },
                    None => ProgressStep {
                        key: *key,
                        status: StepStatus::Pending,
                        started_at: None,
                        finished_at: None,
                        error_message: None,
                    },
                }
            })
            .collect()
    }

    pub fn started_at_millis(&self) -> Option<i64> { parse_timestamp_opt(self.started_at.as_deref()) }
    pub fn finished_at_millis(&self) -> Option<i64> { parse_timestamp_opt(self.finished_at.as_deref()) }

    pub fn complete_status(&self) -> Option<StepStatus> {
        self.steps
            .iter()
            .find(|s| s.key == StepKey::Complete.as_str())
            .map(|s| StepStatus::parse(s.status.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_feed_normalizes_to_full_ordered_list() {
        let raw = r#"{
            "active": true, "version": 3, "current": "chance",
            "steps": [
                {"key": "chance", "status": "running", "started_at": "2024-05-01T10:00:00Z"},
                {"key": "login", "status": "success"},
                {"key": "mystery", "status": "running"}
            ]
        }"#;
        let snap: JobProgressSnapshot = serde_json::from_str(raw).unwrap();
        let steps = snap.normalized_steps();
        assert_eq!(steps.len(), 8);
        assert_eq!(steps[0].key, StepKey::Login);
        assert_eq!(steps[0].status, StepStatus::Success);
        assert_eq!(steps[1].status, StepStatus::Pending);
        assert_eq!(steps[3].status, StepStatus::Running);
        assert!(steps[3].started_at.is_some());
        assert_eq!(steps[7].key, StepKey::Complete);
    }

    #[test]
    fn unknown_status_reads_as_pending() {
        assert_eq!(StepStatus::parse(Some("queued")), StepStatus::Pending);
        assert_eq!(StepStatus::parse(None), StepStatus::Pending);
        assert!(StepStatus::Error.is_terminal());
    }

    #[test]
    fn step_keys_round_trip_through_wire_names() {
        for key in StepKey::ORDER {
            assert_eq!(StepKey::from_key(key.as_str()), Some(key));
        }
        assert!(!StepKey::Complete.is_weighted());
        assert!(StepKey::Complete.expected_secs().is_none());
    }
}
