use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::api::types::{AlertRow, DashboardPayload, MonitoringStatus};
use crate::changes::{ChangeBuffer, SummaryView};
use crate::detect::{Differencer, build_frame};
use crate::iteration::IterationCounter;
use crate::notify::{NotificationGate, PushMessage};
use crate::progress::memo::ProgressMemo;
use crate::progress::types::JobProgressSnapshot;
use crate::progress::{ProgressEvent, ProgressFrame, ProgressTracker};
use crate::sequence::SequenceGuard;
use crate::settings::WatchSettings;
use crate::store::KvStore;
use crate::store::snapshot::SnapshotStore;
use crate::suspend::{Admission, SuspensionController};

pub mod commands;
pub mod render;
pub mod runtime;

/// Side effects the engine asks its host to perform. The engine itself never does I/O
/// beyond the local cache.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Fetch dashboard and pending alerts, then call `on_refresh`.
    Refresh,
    RepollStatus,
    ArmRefreshTimer,
    CancelRefreshTimer,
    PlaySound,
    Push(PushMessage),
    ShowSummary(SummaryView),
    RenderProgress(ProgressFrame),
    ShowIndicator,
    HideIndicator,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AckTarget {
    Alert(i64),
    Agency(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Start,
    Stop,
    ManualRun,
}

/// Owns every piece of watcher state. Single-threaded: the runtime feeds it results and
/// timer ticks and carries out the returned effects.
pub struct Engine {
    settings: WatchSettings,
    store: Box<dyn KvStore>,
    differencer: Differencer,
    buffer: ChangeBuffer,
    gate: NotificationGate,
    suspension: SuspensionController,
    listing_seq: SequenceGuard,
    iterations: IterationCounter,
    progress: ProgressTracker,
    pending_advance: bool,
    /// Last sequence issued before the pending advance was observed. A dashboard fetched at or
    /// below it predates the iteration and cannot confirm it.
    advance_floor: u64,
    dashboard_seq: u64,
    dashboard: Option<DashboardPayload>,
    alerts: Vec<AlertRow>,
    status: Option<MonitoringStatus>,
    recently_acknowledged: HashMap<String, i64>,
    acks_in_flight: HashSet<AckTarget>,
    last_foreground_refresh: Option<i64>,
}

impl Engine {
    pub fn new(settings: WatchSettings, store: Box<dyn KvStore>, push_available: bool, sound_ready: bool) -> Self {
        let differencer = Differencer::new(SnapshotStore::load(store.as_ref()));
        let mut gate = NotificationGate::new(&settings, push_available, sound_ready);
        gate.load(store.as_ref());
        let progress = ProgressTracker::new(
            settings.indicator_hide_after.as_millis() as i64,
            settings.progress_recency.as_millis() as i64,
        );
        Self {
            settings,
            store,
            differencer,
            buffer: ChangeBuffer::new(),
            gate,
            suspension: SuspensionController::new(),
            listing_seq: SequenceGuard::new(),
            iterations: IterationCounter::new(),
            progress,
            pending_advance: false,
            advance_floor: 0,
            dashboard_seq: 0,
            dashboard: None,
            alerts: Vec::new(),
            status: None,
            recently_acknowledged: HashMap::new(),
            acks_in_flight: HashSet::new(),
            last_foreground_refresh: None,
        }
    }

    /// Initial effects: restore a recent completed run, then load everything once.
    pub fn startup(&mut self, now: i64) -> Vec<Effect> {
        let mut effects = Vec::new();
        let memo = ProgressMemo::load(self.store.as_ref());
        if let Some(frame) = self.progress.restore(memo, now) {
            effects.push(Effect::ShowIndicator);
            effects.push(Effect::RenderProgress(frame));
        }
        effects.push(Effect::RepollStatus);
        effects.push(Effect::Refresh);
        if self.gate.is_visible() {
            effects.push(Effect::ArmRefreshTimer);
        }
        effects
    }

    pub fn status(&self) -> Option<&MonitoringStatus> { self.status.as_ref() }
    pub fn alerts(&self) -> &[AlertRow] { &self.alerts }
    pub fn buffered_batches(&self) -> usize { self.buffer.len() }
    #[cfg(test)]
    pub fn pending_advance(&self) -> bool { self.pending_advance }
    pub fn progress_frame(&self, now: i64) -> Option<ProgressFrame> { self.progress.current_frame(now) }

    pub fn on_status(&mut self, status: MonitoringStatus, now: i64) -> Vec<Effect> {
        let mut effects = Vec::new();
        if let Some(adv) = self.iterations.observe(status.total_iterations) {
            info!(total = adv.total, "iteration advanced");
            self.pending_advance = true;
            self.advance_floor = self.listing_seq.issued();
            effects.push(Effect::Refresh);
        }
        self.status = Some(status);
        self.prune_acknowledged(now);
        effects
    }

    /// Sequence number for the next dashboard/alerts fetch.
    pub fn begin_refresh(&mut self) -> u64 { self.listing_seq.issue() }

    /// Apply a finished refresh. Either half may have failed (None). A refresh overtaken by a
    /// newer one is dropped whole. Detection only runs on a fresh dashboard so a failed fetch
    /// never consumes the iteration signal.
    pub fn on_refresh(
        &mut self,
        seq: u64,
        dashboard: Option<DashboardPayload>,
        alerts: Option<Vec<AlertRow>>,
        now: i64,
    ) -> Vec<Effect> {
        if !self.listing_seq.admit(seq) {
            return Vec::new();
        }
        if let Some(alerts) = alerts {
            self.apply_alerts(alerts, now);
        }
        match dashboard {
            Some(d) => {
                self.dashboard = Some(d);
                self.dashboard_seq = seq;
                self.request_detection(now)
            }
            None => Vec::new(),
        }
    }

    fn apply_alerts(&mut self, alerts: Vec<AlertRow>, now: i64) {
        self.prune_acknowledged(now);
        let held = &self.recently_acknowledged;
        self.alerts = alerts
            .into_iter()
            .filter(|a| a.is_pending() && !held.contains_key(&a.agency_code))
            .collect();
    }

    fn prune_acknowledged(&mut self, now: i64) {
        self.recently_acknowledged.retain(|_, until| *until > now);
    }

    /// Attempt a detection cycle, honouring any open suspension window.
    pub fn request_detection(&mut self, now: i64) -> Vec<Effect> {
        match self.suspension.admit(now, self.pending_advance) {
            Admission::Proceed => self.run_detection(now),
            Admission::Deferred { fire_at } => {
                debug!(fire_at, "detection deferred by suspension");
                Vec::new()
            }
            Admission::Skipped => {
                debug!("detection skipped while suspended");
                Vec::new()
            }
        }
    }

    fn run_detection(&mut self, now: i64) -> Vec<Effect> {
        let Some(dashboard) = self.dashboard.as_ref() else { return Vec::new() };
        let frame = build_frame(dashboard, &self.alerts, now);
        let fresh = self.dashboard_seq > self.advance_floor;
        let advanced = self.differencer.has_baseline() && self.pending_advance && fresh;
        if advanced {
            self.pending_advance = false;
        }
        let Some(batch) = self.differencer.detect(&frame, advanced, now, self.store.as_mut()) else {
            return Vec::new();
        };
        info!(changes = batch.changes.len(), new_entities = batch.new_entities.len(), "iteration changes detected");

        let decision = self.gate.decide(&batch, now);
        self.buffer.append(batch);
        let mut effects = Vec::new();
        if decision.sound {
            effects.push(Effect::PlaySound);
        }
        if let Some(msg) = decision.push {
            effects.push(Effect::Push(msg));
        }
        if decision.open_summary {
            effects.extend(self.present_summary(now));
        }
        effects
    }

    fn present_summary(&mut self, now: i64) -> Option<Effect> {
        if self.buffer.is_empty() || self.gate.summary_open() {
            return None;
        }
        self.gate.mark_shown(now, self.store.as_mut());
        Some(Effect::ShowSummary(self.buffer.take_summary(now)))
    }

    /// User asked for the summary.
    pub fn open_summary(&mut self, now: i64) -> Option<SummaryView> {
        match self.present_summary(now) {
            Some(Effect::ShowSummary(view)) => Some(view),
            _ => None,
        }
    }

    pub fn close_summary(&mut self) { self.gate.mark_closed(); }

    pub fn on_progress(&mut self, snap: JobProgressSnapshot, now: i64) -> Vec<Effect> {
        let update = self.progress.observe(snap, now, self.store.as_mut());
        let mut effects = Vec::new();
        if update.show_indicator {
            effects.push(Effect::ShowIndicator);
        }
        if let Some(frame) = update.frame {
            effects.push(Effect::RenderProgress(frame));
        }
        for event in update.events {
            match event {
                ProgressEvent::RunStarted => info!("collection run started"),
                ProgressEvent::RunFinished { success } => {
                    info!(success, "collection run finished");
                    // the status counter is the authority on completion; ask it now
                    effects.push(Effect::RepollStatus);
                }
            }
        }
        effects
    }

    /// Timer expiry: deferred detection, indicator auto-hide, parked summary.
    pub fn on_timer(&mut self, now: i64) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.suspension.take_due(now) {
            debug!("running deferred detection");
            effects.extend(self.request_detection(now));
        }
        if self.progress.tick(now) {
            effects.push(Effect::HideIndicator);
        }
        if self.gate.on_tick(now) {
            effects.extend(self.present_summary(now));
        }
        effects
    }

    pub fn next_deadline(&self) -> Option<i64> {
        [self.suspension.next_deadline(), self.progress.next_deadline(), self.gate.next_deadline()]
            .into_iter()
            .flatten()
            .min()
    }

    pub fn set_visibility(&mut self, visible: bool, now: i64) -> Vec<Effect> {
        let mut effects = Vec::new();
        if !visible {
            if self.gate.is_visible() {
                self.gate.on_background();
                effects.push(Effect::CancelRefreshTimer);
            }
            return effects;
        }
        if self.gate.is_visible() {
            return effects;
        }
        let open_parked = self.gate.on_foreground(now);
        let debounce = self.settings.foreground_refresh_debounce.as_millis() as i64;
        if self.last_foreground_refresh.is_none_or(|t| now - t >= debounce) {
            self.last_foreground_refresh = Some(now);
            effects.push(Effect::Refresh);
        }
        effects.push(Effect::ArmRefreshTimer);
        if open_parked {
            effects.extend(self.present_summary(now));
        }
        effects
    }

    /// A playback channel became usable; replay a parked sound once.
    pub fn on_sound_ready(&mut self) -> Vec<Effect> {
        if self.gate.on_sound_ready() { vec![Effect::PlaySound] } else { Vec::new() }
    }

    /// Start acknowledging. Returns the alert ids to report, or None when there is nothing
    /// to do or the same target is already in flight. Arms the suspension window.
    pub fn begin_ack(&mut self, target: AckTarget, now: i64) -> Option<Vec<i64>> {
        if self.acks_in_flight.contains(&target) {
            debug!(?target, "acknowledgement already in flight");
            return None;
        }
        let (ids, window) = match &target {
            AckTarget::Alert(id) => (vec![*id], self.settings.ack_suspend),
            AckTarget::Agency(code) => {
                let ids: Vec<i64> = self.alerts.iter().filter(|a| &a.agency_code == code).map(|a| a.id).collect();
                if ids.is_empty() {
                    warn!(agency = %code, "no pending alerts to acknowledge");
                    return None;
                }
                // optimistic removal of the whole agency
                self.alerts.retain(|a| &a.agency_code != code);
                (ids, self.settings.ack_agency_suspend)
            }
        };
        self.suspension.suspend(now, window.as_millis() as i64);
        self.acks_in_flight.insert(target);
        Some(ids)
    }

    /// Finish an acknowledgement with the ids the backend accepted.
    pub fn finish_ack(&mut self, target: AckTarget, accepted: &[i64], now: i64) -> Vec<Effect> {
        self.acks_in_flight.remove(&target);
        if accepted.is_empty() {
            // restore whatever was optimistically removed
            return vec![Effect::Refresh];
        }
        let agency = match &target {
            AckTarget::Agency(code) => Some(code.clone()),
            AckTarget::Alert(id) => self.alerts.iter().find(|a| a.id == *id).map(|a| a.agency_code.clone()),
        };
        self.alerts.retain(|a| !accepted.contains(&a.id));
        if let Some(code) = agency {
            let ttl = self.settings.recently_acknowledged_ttl.as_millis() as i64;
            self.recently_acknowledged.insert(code, now + ttl);
        }
        vec![Effect::Refresh]
    }

    /// After a successful job-control request.
    pub fn after_control(&mut self, action: ControlAction) -> Vec<Effect> {
        let mut effects = vec![Effect::RepollStatus];
        if action == ControlAction::ManualRun && self.progress.force_show() {
            effects.push(Effect::ShowIndicator);
        }
        effects
    }
}
