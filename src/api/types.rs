use serde::{Deserialize, Serialize};

// Wire shapes of the monitoring backend. Only the fields the engine consumes are modelled;
// everything else in the payloads is ignored.

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DashboardPayload {
    #[serde(default)]
    pub latest_activity: Vec<ActivityRecord>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ActivityRecord {
    pub agency_code: String,
    #[serde(default)]
    pub agency_name: Option<String>,
    #[serde(default)]
    pub sales: Option<f64>,
    #[serde(default)]
    pub balance: Option<f64>,
    #[serde(default)]
    pub time: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AlertRow {
    pub id: i64,
    pub agency_code: String,
    #[serde(default)]
    pub agency_name: Option<String>,
    #[serde(default)]
    pub alert_type: Option<String>,
    #[serde(default)]
    pub reported_at: Option<String>,
}

impl AlertRow {
    pub fn is_pending(&self) -> bool { self.reported_at.is_none() }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MonitoringStatus {
    pub is_running: bool,
    #[serde(default)]
    pub next_run_time: Option<String>,
    #[serde(default)]
    pub total_iterations: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ManualIterationResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub agencies_processed: Option<i64>,
    #[serde(default)]
    pub alerts_generated: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ApiDetail {
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}
