use serde::{Deserialize, Serialize};

/// Last-known state of one agency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub entity_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub sales: f64,
    pub balance: f64,
    pub pending_alert_count: u32,
    pub captured_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeRecord {
    pub entity_id: String,
    pub display_name: Option<String>,
    pub delta_sales: f64,
    pub delta_balance: f64,
    pub delta_alert_count: i64,
    pub sales: f64,
    pub balance: f64,
    pub alert_count: u32,
    /// Milliseconds since the previous snapshot of this entity was captured.
    pub time_since_prior_change: i64,
}

/// First sighting of an agency that already has pending alerts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewEntityEvent {
    pub entity_id: String,
    pub display_name: Option<String>,
    pub sales: f64,
    pub balance: f64,
    pub alert_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeBatch {
    pub captured_at: i64,
    pub changes: Vec<ChangeRecord>,
    pub new_entities: Vec<NewEntityEvent>,
}

impl ChangeBatch {
    pub fn is_empty(&self) -> bool { self.changes.is_empty() && self.new_entities.is_empty() }
}
