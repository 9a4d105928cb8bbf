use serde::Serialize;
use tracing::debug;

use crate::store::KvStore;
use crate::util::time::{format_run_duration, parse_timestamp_opt};

pub mod memo;
pub mod percent;
pub mod types;

use memo::ProgressMemo;
use percent::completion_percent;
use types::{JobProgressSnapshot, ProgressStep, StepKey, StepStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    InProgress,
    Completed,
    Failed,
    Idle,
}

/// Everything a renderer needs for one progress redraw.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressFrame {
    pub pct: u8,
    pub active: bool,
    pub outcome: RunOutcome,
    pub current: Option<StepKey>,
    pub steps: Vec<ProgressStep>,
    pub duration_ms: Option<i64>,
}

impl ProgressFrame {
    /// One-line framing of the run, e.g. "iteration in progress (42%)".
    pub fn headline(&self) -> String {
        let duration = self.duration_ms.filter(|d| *d > 0).map(format_run_duration);
        match self.outcome {
            RunOutcome::InProgress => format!("iteration in progress ({}%)", self.pct),
            RunOutcome::Completed => match duration {
                Some(d) => format!("last iteration completed in {d}"),
                None => "last iteration completed".to_string(),
            },
            RunOutcome::Failed => match duration {
                Some(d) => format!("last iteration finished with errors after {d}"),
                None => "last iteration finished with errors".to_string(),
            },
            RunOutcome::Idle => "no active iteration".to_string(),
        }
    }

    pub fn current_label(&self) -> Option<&'static str> { self.current.map(|k| k.label()) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    RunStarted,
    RunFinished { success: bool },
}

#[derive(Debug, Default)]
pub struct ProgressUpdate {
    pub frame: Option<ProgressFrame>,
    pub events: Vec<ProgressEvent>,
    pub show_indicator: bool,
}

/// Reconstructs a backend job's run from repeated progress polls.
#[derive(Debug)]
pub struct ProgressTracker {
    last: Option<JobProgressSnapshot>,
    active: bool,
    high_water: f64,
    indicator_visible: bool,
    hide_at: Option<i64>,
    hide_after_ms: i64,
    recency_ms: i64,
}

impl ProgressTracker {
    pub fn new(hide_after_ms: i64, recency_ms: i64) -> Self {
        Self {
            last: None,
            active: false,
            high_water: 0.0,
            indicator_visible: false,
            hide_at: None,
            hide_after_ms,
            recency_ms,
        }
    }

    #[cfg(test)]
    pub fn indicator_visible(&self) -> bool { self.indicator_visible }

    pub fn next_deadline(&self) -> Option<i64> { self.hide_at }

    /// Latest known frame, re-extrapolated to `now`.
    pub fn current_frame(&self, now: i64) -> Option<ProgressFrame> {
        self.last.as_ref().map(|snap| self.frame_for(snap, now, false))
    }

    /// Bring the indicator up regardless of run state (manual runs).
    pub fn force_show(&mut self) -> bool {
        let was = self.indicator_visible;
        self.indicator_visible = true;
        !was
    }

    pub fn observe(&mut self, snap: JobProgressSnapshot, now: i64, store: &mut dyn KvStore) -> ProgressUpdate {
        let mut update = ProgressUpdate::default();
        let unchanged = match (&self.last, snap.version) {
            (Some(prev), Some(v)) => prev.version == Some(v),
            _ => false,
        };

        if unchanged {
            // same backend state; still redraw so a running step keeps advancing
            if snap.active {
                update.frame = Some(self.render(&snap, now));
            }
        } else {
            let new_run = snap.active
                && match &self.last {
                    None => true,
                    Some(prev) if !prev.active => true,
                    Some(prev) => match (&prev.started_at, &snap.started_at) {
                        (Some(a), Some(b)) => a != b,
                        _ => false,
                    },
                };
            if new_run {
                debug!(started_at = ?snap.started_at, "new collection run observed");
                self.high_water = 0.0;
                self.hide_at = None;
                ProgressMemo::clear(store);
                update.events.push(ProgressEvent::RunStarted);
            }
            update.frame = Some(self.render(&snap, now));
            self.last = Some(snap.clone());
        }

        if snap.active {
            if !self.active {
                self.active = true;
                self.hide_at = None;
                if !self.indicator_visible {
                    self.indicator_visible = true;
                    update.show_indicator = true;
                }
            }
        } else if self.active {
            self.active = false;
            let frame = self.frame_for(&snap, now, true);
            let success = frame.outcome == RunOutcome::Completed;
            self.hide_at = Some(now + self.hide_after_ms);
            ProgressMemo {
                pct: 100,
                started_at: snap.started_at.clone(),
                finished_at: snap.finished_at.clone(),
                status: snap.complete_status().map(|s| s.as_str().to_string()),
                ts: now,
            }
            .save(store);
            update.frame = Some(frame);
            update.events.push(ProgressEvent::RunFinished { success });
        }
        update
    }

    /// Hide timer. Returns true when the indicator was hidden at `now`.
    pub fn tick(&mut self, now: i64) -> bool {
        match self.hide_at {
            Some(at) if now >= at => {
                self.hide_at = None;
                if self.active {
                    return false;
                }
                let was = self.indicator_visible;
                self.indicator_visible = false;
                was
            }
            _ => false,
        }
    }

    /// Startup recovery from a persisted run. Shows the completed indicator when recent enough.
    pub fn restore(&mut self, memo: Option<ProgressMemo>, now: i64) -> Option<ProgressFrame> {
        let memo = memo?;
        if !memo.is_restorable(now, self.recency_ms) {
            return None;
        }
        self.indicator_visible = true;
        self.hide_at = Some(now + self.hide_after_ms);
        let failed = memo.status.as_deref() == Some(StepStatus::Error.as_str());
        let duration_ms = match (parse_timestamp_opt(memo.started_at.as_deref()), parse_timestamp_opt(memo.finished_at.as_deref())) {
            (Some(s), Some(f)) => Some(f - s),
            _ => None,
        };
        Some(ProgressFrame {
            pct: 100,
            active: false,
            outcome: if failed { RunOutcome::Failed } else { RunOutcome::Completed },
            current: None,
            steps: Vec::new(),
            duration_ms,
        })
    }

    fn render(&mut self, snap: &JobProgressSnapshot, now: i64) -> ProgressFrame {
        let frame = self.frame_for(snap, now, false);
        if snap.active {
            self.high_water = self.high_water.max(f64::from(frame.pct));
        }
        frame
    }

    fn frame_for(&self, snap: &JobProgressSnapshot, now: i64, finishing: bool) -> ProgressFrame {
        let steps = snap.normalized_steps();
        let any_error = steps.iter().any(|s| s.status == StepStatus::Error);
        let pct = if snap.active {
            completion_percent(&steps, now).max(self.high_water)
        } else if finishing || steps.iter().any(|s| s.status != StepStatus::Pending) {
            100.0
        } else {
            0.0
        };
        let outcome = if snap.active {
            RunOutcome::InProgress
        } else {
            let complete_ok = steps
                .iter()
                .find(|s| s.key == StepKey::Complete)
                .is_some_and(|s| s.status == StepStatus::Success);
            if complete_ok && !any_error {
                RunOutcome::Completed
            } else if any_error {
                RunOutcome::Failed
            } else {
                RunOutcome::Idle
            }
        };
        let current = if snap.active {
            snap.current
                .as_deref()
                .and_then(StepKey::from_key)
                .or_else(|| steps.iter().find(|s| s.status == StepStatus::Running).map(|s| s.key))
        } else {
            None
        };
        let duration_ms = match (snap.started_at_millis(), snap.finished_at_millis()) {
            (Some(s), Some(f)) => Some(f - s),
            _ => None,
        };
        ProgressFrame {
            pct: pct.round().clamp(0.0, 100.0) as u8,
            active: snap.active,
            outcome,
            current,
            steps,
            duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::types::WireStep;
    use crate::store::{MemoryStore, PROGRESS_KEY};
    use chrono::{TimeZone, Utc};

    const T0: i64 = 1_714_557_600_000;

    fn iso(ms: i64) -> String { Utc.timestamp_millis_opt(ms).unwrap().to_rfc3339() }

    fn wire(key: &str, status: &str, started: Option<i64>) -> WireStep {
        WireStep { key: key.into(), status: Some(status.into()), started_at: started.map(iso), ..Default::default() }
    }

    fn snap(active: bool, version: i64, started: i64, steps: Vec<WireStep>) -> JobProgressSnapshot {
        JobProgressSnapshot {
            active,
            version: Some(version),
            started_at: Some(iso(started)),
            finished_at: None,
            current: None,
            steps,
        }
    }

    fn tracker() -> ProgressTracker { ProgressTracker::new(25_000, 300_000) }

    #[test]
    fn extrapolation_advances_on_unchanged_version() {
        let mut kv = MemoryStore::new();
        let mut t = tracker();
        let s = snap(true, 1, T0, vec![wire("login", "success", Some(T0)), wire("chance", "running", Some(T0))]);
        let at2 = t.observe(s.clone(), T0 + 2_000, &mut kv).frame.unwrap();
        let at10 = t.observe(s, T0 + 10_000, &mut kv).frame.unwrap();
        assert!(at10.pct >= at2.pct);
        assert!(at10.pct > at2.pct);
        assert_eq!(at10.current, Some(StepKey::Chance));
    }

    #[test]
    fn unchanged_version_while_inactive_renders_nothing() {
        let mut kv = MemoryStore::new();
        let mut t = tracker();
        let idle = snap(false, 4, T0, vec![]);
        assert!(t.observe(idle.clone(), T0, &mut kv).frame.is_some());
        assert!(t.observe(idle, T0 + 900, &mut kv).frame.is_none());
    }

    #[test]
    fn displayed_percent_never_drops_within_a_run() {
        let mut kv = MemoryStore::new();
        let mut t = tracker();
        let running = snap(true, 1, T0, vec![wire("login", "running", Some(T0))]);
        let first = t.observe(running, T0 + 17_000, &mut kv).frame.unwrap();
        // backend re-reports the step with a later start; extrapolation alone would regress
        let restarted = snap(true, 2, T0, vec![wire("login", "running", Some(T0 + 16_000))]);
        let second = t.observe(restarted, T0 + 17_000, &mut kv).frame.unwrap();
        assert!(second.pct >= first.pct);
    }

    #[test]
    fn new_run_resets_and_clears_memo() {
        let mut kv = MemoryStore::new();
        let mut t = tracker();
        let done: Vec<WireStep> = StepKey::ORDER.iter().map(|k| wire(k.as_str(), "success", Some(T0))).collect();
        t.observe(snap(true, 1, T0, done.clone()), T0, &mut kv);
        let up = t.observe(snap(false, 2, T0, done), T0 + 1_000, &mut kv);
        assert_eq!(up.events, vec![ProgressEvent::RunFinished { success: true }]);
        assert_eq!(up.frame.as_ref().map(|f| f.pct), Some(100));
        assert!(kv.get(PROGRESS_KEY).is_some());

        let next = t.observe(snap(true, 3, T0 + 60_000, vec![wire("login", "running", Some(T0 + 60_000))]), T0 + 60_000, &mut kv);
        assert_eq!(next.events, vec![ProgressEvent::RunStarted]);
        assert_eq!(next.frame.unwrap().pct, 1);
        assert!(kv.get(PROGRESS_KEY).is_none());
    }

    #[test]
    fn changed_started_at_while_active_is_a_new_run() {
        let mut kv = MemoryStore::new();
        let mut t = tracker();
        t.observe(snap(true, 1, T0, vec![]), T0, &mut kv);
        let up = t.observe(snap(true, 2, T0 + 5_000, vec![]), T0 + 5_000, &mut kv);
        assert_eq!(up.events, vec![ProgressEvent::RunStarted]);
        let same = t.observe(snap(true, 3, T0 + 5_000, vec![]), T0 + 6_000, &mut kv);
        assert!(same.events.is_empty());
    }

    #[test]
    fn failed_run_reports_errors_and_hides_later() {
        let mut kv = MemoryStore::new();
        let mut t = tracker();
        let up = t.observe(snap(true, 1, T0, vec![wire("login", "running", Some(T0))]), T0, &mut kv);
        assert!(up.show_indicator);
        let mut end = snap(false, 2, T0, vec![wire("login", "error", Some(T0)), wire("complete", "error", None)]);
        end.finished_at = Some(iso(T0 + 12_340));
        let up = t.observe(end, T0 + 13_000, &mut kv);
        assert_eq!(up.events, vec![ProgressEvent::RunFinished { success: false }]);
        let frame = up.frame.unwrap();
        assert_eq!(frame.outcome, RunOutcome::Failed);
        assert_eq!(frame.headline(), "last iteration finished with errors after 12.3s");

        assert!(!t.tick(T0 + 13_000 + 24_999));
        assert!(t.tick(T0 + 13_000 + 25_000));
        assert!(!t.indicator_visible());
    }

    #[test]
    fn restore_only_recent_completed_runs() {
        let mut t = tracker();
        let memo = ProgressMemo { pct: 100, started_at: None, finished_at: None, status: Some("success".into()), ts: T0 };
        assert!(t.restore(Some(memo.clone()), T0 + 400_000).is_none());
        let frame = t.restore(Some(memo), T0 + 60_000).unwrap();
        assert_eq!(frame.pct, 100);
        assert_eq!(frame.outcome, RunOutcome::Completed);
        assert!(t.indicator_visible());
        assert_eq!(t.next_deadline(), Some(T0 + 60_000 + 25_000));
    }

    #[test]
    fn idle_headline_without_any_run() {
        let mut kv = MemoryStore::new();
        let mut t = tracker();
        let frame = t.observe(snap(false, 1, T0, vec![]), T0, &mut kv).frame.unwrap();
        assert_eq!(frame.pct, 0);
        assert_eq!(frame.headline(), "no active iteration");
    }
}
