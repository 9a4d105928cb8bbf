use std::collections::HashMap;

use serde::Serialize;

use crate::detect::types::{ChangeBatch, NewEntityEvent};

/// One agency folded across every buffered batch. Presentation only, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedRow {
    pub entity_id: String,
    pub display_name: Option<String>,
    pub delta_sales: f64,
    pub delta_balance: f64,
    pub delta_alert_count: i64,
    pub sales: f64,
    pub balance: f64,
    pub alert_count: u32,
    pub time_since_prior_change: i64,
}

/// What the summary view displays. Taking one empties the buffer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryView {
    pub iterations: usize,
    pub rows: Vec<AggregatedRow>,
    pub new_entities: Vec<NewEntityEvent>,
    pub newest_batch_at: Option<i64>,
    pub shown_at: i64,
}

impl SummaryView {
    pub fn is_empty(&self) -> bool { self.rows.is_empty() && self.new_entities.is_empty() }
}

/// Change batches accumulated while the summary is not on screen.
#[derive(Debug, Default)]
pub struct ChangeBuffer {
    batches: Vec<ChangeBatch>,
}

impl ChangeBuffer {
    pub fn new() -> Self { Self::default() }

    pub fn append(&mut self, batch: ChangeBatch) { self.batches.push(batch); }

    pub fn len(&self) -> usize { self.batches.len() }

    pub fn is_empty(&self) -> bool { self.batches.is_empty() }

    pub fn newest_batch_at(&self) -> Option<i64> { self.batches.last().map(|b| b.captured_at) }

    pub fn clear(&mut self) { self.batches.clear(); }

    /// Fold all buffered batches into one row per agency, in first-seen order.
    /// Deltas sum; current values come from the latest batch mentioning the agency.
    pub fn aggregate(&self) -> Vec<AggregatedRow> {
        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut rows: Vec<AggregatedRow> = Vec::new();
        for change in self.batches.iter().flat_map(|b| b.changes.iter()) {
            match index.get(change.entity_id.as_str()) {
                Some(&i) => {
                    let row = &mut rows[i];
                    row.delta_sales += change.delta_sales;
                    row.delta_balance += change.delta_balance;
                    row.delta_alert_count += change.delta_alert_count;
                    row.sales = change.sales;
                    row.balance = change.balance;
                    row.alert_count = change.alert_count;
                    row.time_since_prior_change = change.time_since_prior_change;
                    if change.display_name.is_some() {
                        row.display_name = change.display_name.clone();
                    }
                }
                None => {
                    index.insert(change.entity_id.as_str(), rows.len());
                    rows.push(AggregatedRow {
                        entity_id: change.entity_id.clone(),
                        display_name: change.display_name.clone(),
                        delta_sales: change.delta_sales,
                        delta_balance: change.delta_balance,
                        delta_alert_count: change.delta_alert_count,
                        sales: change.sales,
                        balance: change.balance,
                        alert_count: change.alert_count,
                        time_since_prior_change: change.time_since_prior_change,
                    });
                }
            }
        }
        rows
    }

    /// Rows worth showing: balance-only churn is dropped, biggest sales movement first.
    pub fn summary_rows(&self) -> Vec<AggregatedRow> {
        let mut rows: Vec<AggregatedRow> = self
            .aggregate()
            .into_iter()
            .filter(|r| r.delta_sales != 0.0 || r.delta_alert_count != 0)
            .collect();
        rows.sort_by(|a, b| b.delta_sales.abs().total_cmp(&a.delta_sales.abs()));
        rows
    }

    /// New-entity events across the buffer, deduplicated by agency (latest wins).
    pub fn new_entities(&self) -> Vec<NewEntityEvent> {
        let mut out: Vec<NewEntityEvent> = Vec::new();
        for ev in self.batches.iter().flat_map(|b| b.new_entities.iter()) {
            match out.iter_mut().find(|e| e.entity_id == ev.entity_id) {
                Some(slot) => *slot = ev.clone(),
                None => out.push(ev.clone()),
            }
        }
        out
    }

    /// Build the summary and clear the buffer in one step, so nothing is counted twice.
    pub fn take_summary(&mut self, now: i64) -> SummaryView {
        let view = SummaryView {
            iterations: self.len(),
            rows: self.summary_rows(),
            new_entities: self.new_entities(),
            newest_batch_at: self.newest_batch_at(),
            shown_at: now,
        };
        self.clear();
        view
    }
}
