use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::api::types::{AlertRow, DashboardPayload};
use crate::store::KvStore;
use crate::store::snapshot::SnapshotStore;

pub mod signature;
pub mod types;

use types::{ChangeBatch, ChangeRecord, EntitySnapshot, NewEntityEvent};

/// Join the dashboard's per-agency activity with the pending alert listing into one frame.
/// When an agency appears more than once the first (most recent) record wins.
pub fn build_frame(dashboard: &DashboardPayload, alerts: &[AlertRow], now: i64) -> Vec<EntitySnapshot> {
    let mut pending: HashMap<&str, u32> = HashMap::new();
    for a in alerts.iter().filter(|a| a.is_pending()) {
        *pending.entry(a.agency_code.as_str()).or_insert(0) += 1;
    }
    let mut seen: HashSet<&str> = HashSet::new();
    let mut frame = Vec::with_capacity(dashboard.latest_activity.len());
    for r in &dashboard.latest_activity {
        if !seen.insert(r.agency_code.as_str()) { continue; }
        frame.push(EntitySnapshot {
            entity_id: r.agency_code.clone(),
            display_name: r.agency_name.clone(),
            sales: r.sales.unwrap_or(0.0),
            balance: r.balance.unwrap_or(0.0),
            pending_alert_count: pending.get(r.agency_code.as_str()).copied().unwrap_or(0),
            captured_at: now,
        });
    }
    frame
}

/// Turns consecutive frames into change batches.
#[derive(Debug, Default)]
pub struct Differencer {
    snapshots: SnapshotStore,
    last_signature: Option<blake3::Hash>,
}

impl Differencer {
    pub fn new(snapshots: SnapshotStore) -> Self {
        Self { snapshots, last_signature: None }
    }

    pub fn has_baseline(&self) -> bool { self.snapshots.has_baseline() }

    /// Compare `frame` against the stored generation.
    ///
    /// The first frame ever seen only seeds the baseline. Without confirmation that a new
    /// iteration completed nothing is compared and the store is left untouched. Otherwise the
    /// store is replaced by `frame` whether or not anything changed, and a batch is returned
    /// unless it is empty or carries the same signature as the previously accepted one.
    pub fn detect(
        &mut self,
        frame: &[EntitySnapshot],
        iteration_advanced: bool,
        now: i64,
        store: &mut dyn KvStore,
    ) -> Option<ChangeBatch> {
        if !self.snapshots.has_baseline() {
            self.snapshots.replace(frame, store);
            debug!(entities = frame.len(), "baseline initialised");
            return None;
        }
        if !iteration_advanced {
            debug!("no completed iteration, skipping diff");
            return None;
        }

        let mut changes = Vec::new();
        let mut new_entities = Vec::new();
        for curr in frame {
            match self.snapshots.get(&curr.entity_id) {
                Some(prev) => {
                    let delta_sales = curr.sales - prev.sales;
                    let delta_balance = curr.balance - prev.balance;
                    let delta_alert_count = i64::from(curr.pending_alert_count) - i64::from(prev.pending_alert_count);
                    if delta_sales != 0.0 || delta_balance != 0.0 || delta_alert_count != 0 {
                        changes.push(ChangeRecord {
                            entity_id: curr.entity_id.clone(),
                            display_name: curr.display_name.clone().or_else(|| prev.display_name.clone()),
                            delta_sales,
                            delta_balance,
                            delta_alert_count,
                            sales: curr.sales,
                            balance: curr.balance,
                            alert_count: curr.pending_alert_count,
                            time_since_prior_change: now - prev.captured_at,
                        });
                    }
                }
                None if curr.pending_alert_count > 0 => new_entities.push(NewEntityEvent {
                    entity_id: curr.entity_id.clone(),
                    display_name: curr.display_name.clone(),
                    sales: curr.sales,
                    balance: curr.balance,
                    alert_count: curr.pending_alert_count,
                }),
                None => {}
            }
        }
        self.snapshots.replace(frame, store);

        let batch = ChangeBatch { captured_at: now, changes, new_entities };
        if batch.is_empty() {
            debug!("no detectable changes");
            return None;
        }
        let sig = signature::batch_signature(&batch);
        if self.last_signature == Some(sig) {
            debug!(signature = %sig.to_hex(), "duplicate change content suppressed");
            return None;
        }
        self.last_signature = Some(sig);
        Some(batch)
    }
}
