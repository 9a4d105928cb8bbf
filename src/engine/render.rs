use serde::Serialize;

use crate::api::types::MonitoringStatus;
use crate::changes::SummaryView;
use crate::progress::ProgressFrame;
use crate::util::time::{format_ago, format_countdown, format_delta, format_delta_count, parse_timestamp_opt};

pub fn summary_text(view: &SummaryView, now: i64) -> String {
    let mut out = format!(
        "📊 Iteration summary — iterations={} agencies={} newly_alerting={} updated={} ago",
        view.iterations,
        view.rows.len(),
        view.new_entities.len(),
        format_ago(view.newest_batch_at.map(|t| now - t)),
    );
    if view.is_empty() {
        out.push_str("\n   (no sales or alert movement)");
    }
    for r in &view.rows {
        let alerts_delta = if r.delta_alert_count != 0 { format_delta_count(r.delta_alert_count) } else { "-".into() };
        out.push_str(&format!(
            "\n   {} | {}  Δsales={} sales={:.2}  Δbalance={} balance={:.2}  alerts={} Δalerts={}  last_change={}",
            r.entity_id,
            r.display_name.as_deref().unwrap_or(""),
            format_delta(r.delta_sales),
            r.sales,
            format_delta(r.delta_balance),
            r.balance,
            r.alert_count,
            alerts_delta,
            format_ago(Some(r.time_since_prior_change)),
        ));
    }
    for n in &view.new_entities {
        out.push_str(&format!(
            "\n   🆕 {} | {}  alerts={} sales={:.2}",
            n.entity_id,
            n.display_name.as_deref().unwrap_or(""),
            n.alert_count,
            n.sales,
        ));
    }
    out
}

pub fn progress_text(frame: &ProgressFrame) -> String {
    let mut out = format!("⏳ {}", frame.headline());
    if let Some(label) = frame.current_label() {
        out.push_str(&format!(" — {label}"));
    }
    for s in &frame.steps {
        let took = match (s.started_at, s.finished_at) {
            (Some(a), Some(b)) => format!(" {:.1}s", (b - a) as f64 / 1000.0),
            _ => String::new(),
        };
        out.push_str(&format!("\n   [{:<7}] {}{}", s.status.as_str(), s.key.label(), took));
        if let Some(msg) = s.error_message.as_deref() {
            out.push_str(&format!(" — {msg}"));
        }
    }
    out
}

#[derive(Debug, Serialize)]
pub struct StatusView {
    pub is_running: bool,
    pub total_iterations: Option<i64>,
    pub next_run_in: Option<String>,
}

impl StatusView {
    pub fn new(status: &MonitoringStatus, now: i64) -> Self {
        Self {
            is_running: status.is_running,
            total_iterations: status.total_iterations,
            next_run_in: parse_timestamp_opt(status.next_run_time.as_deref()).map(|t| format_countdown(t - now)),
        }
    }

    pub fn text(&self) -> String {
        let state = if self.is_running { "running" } else { "stopped" };
        let iterations = self.total_iterations.map_or_else(|| "--".to_string(), |n| n.to_string());
        match &self.next_run_in {
            Some(c) if self.is_running => format!("📡 Monitoring {state} — iterations={iterations} next_run_in={c}"),
            _ => format!("📡 Monitoring {state} — iterations={iterations}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::AggregatedRow;
    use crate::progress::RunOutcome;

    #[test]
    fn summary_lists_rows_with_signed_deltas() {
        let view = SummaryView {
            iterations: 2,
            rows: vec![AggregatedRow {
                entity_id: "A1".into(),
                display_name: Some("North".into()),
                delta_sales: 40.0,
                delta_balance: -2.5,
                delta_alert_count: 1,
                sales: 140.0,
                balance: 47.5,
                alert_count: 1,
                time_since_prior_change: 120_000,
            }],
            new_entities: vec![],
            newest_batch_at: Some(1_000),
            shown_at: 6_000,
        };
        let text = summary_text(&view, 6_000);
        assert!(text.contains("iterations=2 agencies=1 newly_alerting=0 updated=5s ago"));
        assert!(text.contains("A1 | North  Δsales=+40 sales=140.00  Δbalance=-2.50"));
        assert!(text.contains("Δalerts=+1  last_change=2m"));
    }

    #[test]
    fn summary_without_movement_says_so() {
        let view = SummaryView { iterations: 1, rows: vec![], new_entities: vec![], newest_batch_at: None, shown_at: 0 };
        assert!(view.is_empty());
        assert!(summary_text(&view, 0).ends_with("(no sales or alert movement)"));
    }

    #[test]
    fn progress_text_shows_headline_and_current_step() {
        let frame = ProgressFrame {
            pct: 42,
            active: true,
            outcome: RunOutcome::InProgress,
            current: Some(crate::progress::types::StepKey::Chance),
            steps: vec![],
            duration_ms: None,
        };
        assert_eq!(progress_text(&frame), "⏳ iteration in progress (42%) — CHANCE EXPRESS");
    }

    #[test]
    fn status_countdown_only_while_running() {
        let status = MonitoringStatus {
            is_running: true,
            next_run_time: Some("2024-05-01T10:02:05Z".into()),
            total_iterations: Some(7),
        };
        let now = crate::util::time::parse_timestamp_millis("2024-05-01T10:00:00Z").unwrap();
        let view = StatusView::new(&status, now);
        assert_eq!(view.text(), "📡 Monitoring running — iterations=7 next_run_in=02:05");
        let stopped = StatusView { is_running: false, ..view };
        assert_eq!(stopped.text(), "📡 Monitoring stopped — iterations=7");
    }
}
