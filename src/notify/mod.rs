use serde::Serialize;
use tracing::{debug, warn};

use crate::detect::types::ChangeBatch;
use crate::settings::WatchSettings;
use crate::store::{KvStore, SUMMARY_SHOWN_KEY, load_json, save_json};

pub mod channels;

pub const PUSH_TITLE: &str = "Iteration completed";
pub const PUSH_TAG: &str = "iter-summary";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
}

impl PushMessage {
    pub fn for_batch(batch: &ChangeBatch) -> Self {
        Self {
            title: PUSH_TITLE.to_string(),
            body: format!("{} changed • {} newly alerting", batch.changes.len(), batch.new_entities.len()),
        }
    }
}

/// Per-channel outcome for one detected batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateDecision {
    pub sound: bool,
    pub push: Option<PushMessage>,
    pub open_summary: bool,
}

#[derive(Debug, Clone, Copy)]
struct GateRules {
    auto_show: bool,
    push: bool,
    sound: bool,
    cooldown_ms: i64,
    grace_ms: i64,
    push_spacing_ms: i64,
}

/// Arbitrates sound, push and summary auto-open under cooldowns.
#[derive(Debug)]
pub struct NotificationGate {
    rules: GateRules,
    push_available: bool,
    sound_ready: bool,
    sound_pending: bool,
    last_push_at: Option<i64>,
    last_shown_at: Option<i64>,
    summary_open: bool,
    visible: bool,
    pending_summary: bool,
    foreground_at: Option<i64>,
}

impl NotificationGate {
    pub fn new(settings: &WatchSettings, push_available: bool, sound_ready: bool) -> Self {
        Self {
            rules: GateRules {
                auto_show: settings.auto_show_summary,
                push: settings.enable_push,
                sound: settings.enable_sound,
                cooldown_ms: settings.summary_cooldown.as_millis() as i64,
                grace_ms: settings.auto_show_grace.as_millis() as i64,
                push_spacing_ms: settings.push_spacing.as_millis() as i64,
            },
            push_available,
            sound_ready,
            sound_pending: false,
            last_push_at: None,
            last_shown_at: None,
            summary_open: false,
            visible: true,
            pending_summary: false,
            foreground_at: None,
        }
    }

    /// Pick up the persisted "summary last shown" instant.
    pub fn load(&mut self, store: &dyn KvStore) {
        self.last_shown_at = load_json(store, SUMMARY_SHOWN_KEY);
    }

    pub fn is_visible(&self) -> bool { self.visible }
    pub fn summary_open(&self) -> bool { self.summary_open }
    pub fn has_pending_summary(&self) -> bool { self.pending_summary }
    #[cfg(test)]
    pub fn last_shown_at(&self) -> Option<i64> { self.last_shown_at }

    pub fn decide(&mut self, batch: &ChangeBatch, now: i64) -> GateDecision {
        if batch.is_empty() {
            return GateDecision::default();
        }
        self.pending_summary = true;
        GateDecision {
            sound: self.request_sound(),
            push: self.push_for(batch, now),
            open_summary: self.auto_open_allowed(now),
        }
    }

    /// Sound is best effort: when the player is not ready yet the request is parked and
    /// replayed by `on_sound_ready`. Only one request is ever parked.
    fn request_sound(&mut self) -> bool {
        if !self.rules.sound {
            return false;
        }
        if !self.sound_ready {
            debug!("sound not ready, parking request");
            self.sound_pending = true;
            return false;
        }
        true
    }

    pub fn on_sound_ready(&mut self) -> bool {
        self.sound_ready = true;
        std::mem::take(&mut self.sound_pending) && self.rules.sound
    }

    fn push_for(&mut self, batch: &ChangeBatch, now: i64) -> Option<PushMessage> {
        if !self.rules.push || !self.push_available {
            return None;
        }
        if let Some(last) = self.last_push_at {
            if now - last < self.rules.push_spacing_ms {
                debug!(since_ms = now - last, "push spacing not met");
                return None;
            }
        }
        self.last_push_at = Some(now);
        Some(PushMessage::for_batch(batch))
    }

    fn cooldown_elapsed(&self, now: i64) -> bool {
        self.last_shown_at.is_none_or(|t| now - t > self.rules.cooldown_ms)
    }

    fn auto_open_allowed(&self, now: i64) -> bool {
        self.rules.auto_show && self.visible && !self.summary_open && self.has_pending_summary() && self.cooldown_elapsed(now)
    }

    fn in_grace(&self, now: i64) -> bool {
        self.foreground_at.is_some_and(|t| now - t < self.rules.grace_ms)
    }

    /// Background to foreground. Returns whether a parked summary opens now.
    pub fn on_foreground(&mut self, now: i64) -> bool {
        if !self.visible {
            self.visible = true;
            self.foreground_at = Some(now);
        }
        self.auto_open_allowed(now) && self.in_grace(now)
    }

    pub fn on_background(&mut self) {
        self.visible = false;
        self.foreground_at = None;
    }

    /// Timer check: a parked summary may still open while inside a foreground grace window,
    /// once the cooldown allows it.
    pub fn on_tick(&mut self, now: i64) -> bool {
        self.auto_open_allowed(now) && self.in_grace(now)
    }

    /// Next instant `on_tick` could return true.
    pub fn next_deadline(&self) -> Option<i64> {
        if !self.rules.auto_show || !self.pending_summary || self.summary_open || !self.visible {
            return None;
        }
        let window_end = self.foreground_at? + self.rules.grace_ms;
        let due = self.last_shown_at.map_or(0, |t| t + self.rules.cooldown_ms + 1);
        (due < window_end).then_some(due)
    }

    pub fn mark_shown(&mut self, now: i64, store: &mut dyn KvStore) {
        self.summary_open = true;
        self.pending_summary = false;
        self.last_shown_at = Some(now);
        if let Err(e) = save_json(store, SUMMARY_SHOWN_KEY, &now) {
            warn!(error = %e, "failed to persist summary timestamp");
        }
    }

    pub fn mark_closed(&mut self) { self.summary_open = false; }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::types::{ChangeRecord, NewEntityEvent};
    use crate::store::MemoryStore;

    fn batch(at: i64) -> ChangeBatch {
        ChangeBatch {
            captured_at: at,
            changes: vec![ChangeRecord {
                entity_id: "A".into(),
                display_name: None,
                delta_sales: 1.0,
                delta_balance: 0.0,
                delta_alert_count: 0,
                sales: 1.0,
                balance: 0.0,
                alert_count: 0,
                time_since_prior_change: 0,
            }],
            new_entities: vec![NewEntityEvent { entity_id: "N".into(), display_name: None, sales: 0.0, balance: 0.0, alert_count: 1 }],
        }
    }

    fn gate() -> NotificationGate { NotificationGate::new(&WatchSettings::default(), true, true) }

    #[test]
    fn cooldown_allows_one_auto_open_for_close_batches() {
        let mut kv = MemoryStore::new();
        let mut g = gate();
        let mut opens = 0;
        for at in [100_000, 103_000] {
            if g.decide(&batch(at), at).open_summary {
                opens += 1;
                g.mark_shown(at, &mut kv);
                g.mark_closed();
            }
        }
        assert_eq!(opens, 1);
        // nothing reopens on its own without a foreground transition
        assert!(!g.on_tick(120_000));
    }

    #[test]
    fn push_spacing_and_body() {
        let mut g = gate();
        let first = g.decide(&batch(0), 0).push.unwrap();
        assert_eq!(first.title, "Iteration completed");
        assert_eq!(first.body, "1 changed • 1 newly alerting");
        assert!(g.decide(&batch(2_999), 2_999).push.is_none());
        assert!(g.decide(&batch(3_000), 3_000).push.is_some());
    }

    #[test]
    fn push_needs_capability() {
        let mut g = NotificationGate::new(&WatchSettings::default(), false, true);
        assert!(g.decide(&batch(0), 0).push.is_none());
    }

    #[test]
    fn empty_batch_triggers_nothing() {
        let mut g = gate();
        let empty = ChangeBatch { captured_at: 0, changes: vec![], new_entities: vec![] };
        assert_eq!(g.decide(&empty, 0), GateDecision::default());
        assert!(!g.has_pending_summary());
    }

    #[test]
    fn parked_sound_replays_once_when_ready() {
        let mut g = NotificationGate::new(&WatchSettings::default(), true, false);
        assert!(!g.decide(&batch(0), 0).sound);
        assert!(!g.decide(&batch(5_000), 5_000).sound);
        assert!(g.on_sound_ready());
        assert!(!g.on_sound_ready());
        assert!(g.decide(&batch(9_000), 9_000).sound);
    }

    #[test]
    fn hidden_batch_opens_on_foreground_within_grace() {
        let mut kv = MemoryStore::new();
        let mut g = gate();
        g.on_background();
        assert!(!g.decide(&batch(1_000), 1_000).open_summary);
        assert!(g.on_foreground(50_000));
        g.mark_shown(50_000, &mut kv);
        assert!(!g.has_pending_summary());
    }

    #[test]
    fn foreground_inside_cooldown_waits_for_it_within_grace() {
        let mut kv = MemoryStore::new();
        let mut g = gate();
        g.decide(&batch(0), 0);
        g.mark_shown(0, &mut kv);
        g.mark_closed();
        g.on_background();
        g.decide(&batch(2_000), 2_000);
        assert!(!g.on_foreground(4_000));
        assert_eq!(g.next_deadline(), Some(10_001));
        assert!(!g.on_tick(10_000));
        assert!(g.on_tick(10_001));
    }

    #[test]
    fn grace_window_expires() {
        let mut kv = MemoryStore::new();
        let settings = WatchSettings { summary_cooldown: std::time::Duration::from_secs(60), ..Default::default() };
        let mut g = NotificationGate::new(&settings, true, true);
        g.decide(&batch(0), 0);
        g.mark_shown(0, &mut kv);
        g.mark_closed();
        g.on_background();
        g.decide(&batch(1_000), 1_000);
        // cooldown outlasts the grace window
        assert!(!g.on_foreground(2_000));
        assert_eq!(g.next_deadline(), None);
        assert!(!g.on_tick(21_999));
    }

    #[test]
    fn last_shown_survives_restart() {
        let mut kv = MemoryStore::new();
        let mut g = gate();
        g.mark_shown(42_000, &mut kv);
        let mut fresh = gate();
        fresh.load(&kv);
        assert_eq!(fresh.last_shown_at(), Some(42_000));
        assert!(!fresh.decide(&batch(45_000), 45_000).open_summary);
    }
}
