use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval, interval_at, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::api::types::{AlertRow, DashboardPayload, ManualIterationResult, MonitoringStatus};
use crate::api::{ApiError, MonitorBackend};
use crate::clock::SharedClock;
use crate::notify::channels::{PushNotifier, SoundPlayer};
use crate::output::types::Meta;
use crate::progress::types::{JobProgressSnapshot, StepKey};
use crate::progress::{ProgressFrame, RunOutcome};
use crate::settings::WatchSettings;
use crate::store::KvStore;
use crate::telemetry;
use crate::telemetry::ctx::LogCtx;
use crate::telemetry::ops::watch::{Phase, Watch};

use super::commands::{self, Command, HELP};
use super::render::{StatusView, progress_text, summary_text};
use super::{AckTarget, ControlAction, Effect, Engine};

pub struct Channels {
    pub sound: Box<dyn SoundPlayer>,
    pub push: Arc<dyn PushNotifier>,
}

enum Inbound {
    Status(Result<MonitoringStatus, ApiError>),
    Progress(Result<JobProgressSnapshot, ApiError>),
    Refreshed {
        seq: u64,
        dashboard: Result<DashboardPayload, ApiError>,
        alerts: Result<Vec<AlertRow>, ApiError>,
    },
    Acked {
        target: AckTarget,
        accepted: Vec<i64>,
    },
    Controlled {
        action: ControlAction,
        result: Result<Option<ManualIterationResult>, ApiError>,
    },
}

struct Timers {
    progress: Interval,
    refresh: Interval,
    refresh_armed: bool,
}

#[derive(Serialize)]
struct WatchPlan<'a> {
    run_id: &'a str,
    progress_interval_ms: u64,
    refresh_interval_ms: u64,
    auto_show_summary: bool,
    sound: bool,
    push: bool,
    push_available: bool,
}

#[derive(Serialize)]
struct IndicatorView {
    visible: bool,
}

/// Drives an [`Engine`] from tokio timers, backend responses and typed commands.
pub struct WatchRuntime {
    backend: Arc<dyn MonitorBackend>,
    engine: Engine,
    clock: SharedClock,
    settings: WatchSettings,
    channels: Channels,
    tx: mpsc::UnboundedSender<Inbound>,
    rx: Option<mpsc::UnboundedReceiver<Inbound>>,
    progress_in_flight: bool,
    sound_ready: bool,
    start_hidden: bool,
    last_progress: Option<(u8, RunOutcome, Option<StepKey>)>,
    run_id: String,
    log: LogCtx<Watch>,
}

impl WatchRuntime {
    pub fn new(
        backend: Arc<dyn MonitorBackend>,
        settings: WatchSettings,
        store: Box<dyn KvStore>,
        channels: Channels,
        clock: SharedClock,
    ) -> Self {
        let sound_ready = channels.sound.is_ready();
        let engine = Engine::new(settings.clone(), store, channels.push.is_available(), sound_ready);
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            backend,
            engine,
            clock,
            settings,
            channels,
            tx,
            rx: Some(rx),
            progress_in_flight: false,
            sound_ready,
            start_hidden: false,
            last_progress: None,
            run_id: Uuid::new_v4().to_string(),
            log: telemetry::watch(),
        }
    }

    /// Start hidden (backgrounded); the periodic refresh stays off until `show`.
    pub fn hidden(mut self, hidden: bool) -> Self {
        self.start_hidden = hidden;
        self
    }

    pub async fn run(self, commands: mpsc::Receiver<String>, shutdown: CancellationToken) -> Result<()> {
        let root = self.log.root_span_kv([
            ("run_id", self.run_id.clone()),
            ("progress_interval_ms", self.settings.progress_interval.as_millis().to_string()),
            ("refresh_interval_secs", self.settings.refresh_interval.as_secs().to_string()),
        ]);
        self.run_loop(commands, shutdown).instrument(root).await
    }

    async fn run_loop(mut self, mut commands: mpsc::Receiver<String>, shutdown: CancellationToken) -> Result<()> {
        let Some(mut rx) = self.rx.take() else { return Ok(()) };
        let plan = WatchPlan {
            run_id: &self.run_id,
            progress_interval_ms: self.settings.progress_interval.as_millis() as u64,
            refresh_interval_ms: self.settings.refresh_interval.as_millis() as u64,
            auto_show_summary: self.settings.auto_show_summary,
            sound: self.settings.enable_sound,
            push: self.settings.enable_push,
            push_available: self.channels.push.is_available(),
        };
        if telemetry::config::json_mode() {
            self.log.plan(&plan)?;
        }

        let mut timers = Timers {
            progress: interval(self.settings.progress_interval),
            refresh: interval_at(Instant::now() + self.settings.refresh_interval, self.settings.refresh_interval),
            refresh_armed: false,
        };
        timers.progress.set_missed_tick_behavior(MissedTickBehavior::Delay);
        timers.refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let now = self.now();
        if self.start_hidden {
            let effects = self.engine.set_visibility(false, now);
            self.apply(effects, &mut timers)?;
        }
        let effects = self.engine.startup(now);
        self.apply(effects, &mut timers)?;

        let mut commands_open = true;
        loop {
            let deadline = self.engine.next_deadline().map(|at| {
                let wait = (at - self.now()).max(0) as u64;
                Instant::now() + Duration::from_millis(wait)
            });
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = timers.progress.tick() => self.poll_progress(),
                _ = timers.refresh.tick(), if timers.refresh_armed => {
                    self.poll_status();
                    self.refresh();
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    let now = self.now();
                    let effects = self.engine.on_timer(now);
                    self.apply(effects, &mut timers)?;
                }
                Some(msg) = rx.recv() => {
                    let effects = self.handle_inbound(msg);
                    self.apply(effects, &mut timers)?;
                }
                line = commands.recv(), if commands_open => match line {
                    Some(line) => {
                        if !self.handle_line(&line, &mut timers)? {
                            break;
                        }
                    }
                    None => commands_open = false,
                },
            }
        }
        self.log.info("👋 watch stopped");
        Ok(())
    }

    fn now(&self) -> i64 { self.clock.now_millis() }

    fn poll_progress(&mut self) {
        if self.progress_in_flight {
            return;
        }
        self.progress_in_flight = true;
        let backend = self.backend.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(Inbound::Progress(backend.progress().await));
        });
    }

    fn poll_status(&self) {
        let backend = self.backend.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(Inbound::Status(backend.status().await));
        });
    }

    fn refresh(&mut self) {
        let seq = self.engine.begin_refresh();
        let backend = self.backend.clone();
        let tx = self.tx.clone();
        let dashboard_span = self.log.span(&Phase::Dashboard);
        let alerts_span = self.log.span(&Phase::Alerts);
        tokio::spawn(async move {
            let (dashboard, alerts) = tokio::join!(
                backend.dashboard().instrument(dashboard_span),
                backend.pending_alerts().instrument(alerts_span),
            );
            let _ = tx.send(Inbound::Refreshed { seq, dashboard, alerts });
        });
    }

    fn handle_inbound(&mut self, msg: Inbound) -> Vec<Effect> {
        let now = self.now();
        match msg {
            Inbound::Status(Ok(status)) => {
                let _s = self.log.span(&Phase::Status).entered();
                self.engine.on_status(status, now)
            }
            Inbound::Status(Err(e)) => {
                self.log.poll_failed("monitoring/status", &e);
                Vec::new()
            }
            Inbound::Progress(result) => {
                self.progress_in_flight = false;
                match result {
                    Ok(snap) => {
                        let _s = self.log.span(&Phase::Progress).entered();
                        self.engine.on_progress(snap, now)
                    }
                    Err(e) => {
                        self.log.poll_failed("monitoring/progress", &e);
                        Vec::new()
                    }
                }
            }
            Inbound::Refreshed { seq, dashboard, alerts } => {
                let dashboard = dashboard
                    .map_err(|e| self.log.poll_failed("dashboard", &e))
                    .ok();
                let alerts = alerts.map_err(|e| self.log.poll_failed("alerts", &e)).ok();
                let _s = self.log.span(&Phase::Detect).entered();
                self.engine.on_refresh(seq, dashboard, alerts, now)
            }
            Inbound::Acked { target, accepted } => {
                let _s = self.log.span(&Phase::Acknowledge).entered();
                self.log.info_kv("✅ acknowledged", [("target", format!("{target:?}")), ("accepted", accepted.len().to_string())]);
                self.engine.finish_ack(target, &accepted, now)
            }
            Inbound::Controlled { action, result } => match result {
                Ok(manual) => {
                    if let Some(m) = manual {
                        self.log.info(format!(
                            "▶️  Manual iteration — success={} agencies={} alerts={}",
                            m.success,
                            m.agencies_processed.unwrap_or(0),
                            m.alerts_generated.unwrap_or(0)
                        ));
                    }
                    self.engine.after_control(action)
                }
                Err(e) => {
                    self.log.warn(format!("{action:?} request failed: {e}"));
                    Vec::new()
                }
            },
        }
    }

    fn apply(&mut self, effects: Vec<Effect>, timers: &mut Timers) -> Result<()> {
        for effect in effects {
            match effect {
                Effect::Refresh => self.refresh(),
                Effect::RepollStatus => self.poll_status(),
                Effect::ArmRefreshTimer => {
                    timers.refresh.reset();
                    timers.refresh_armed = true;
                }
                Effect::CancelRefreshTimer => timers.refresh_armed = false,
                Effect::PlaySound => {
                    let _s = self.log.span(&Phase::Notify).entered();
                    if let Err(e) = self.channels.sound.play() {
                        self.log.debug(format!("sound skipped: {e}"));
                    }
                }
                Effect::Push(msg) => {
                    let push = self.channels.push.clone();
                    let log = telemetry::watch();
                    tokio::spawn(async move {
                        if let Err(e) = push.deliver(&msg).await {
                            log.debug(format!("push skipped: {e:#}"));
                        }
                    });
                }
                Effect::ShowSummary(view) => {
                    let _s = self.log.span(&Phase::Summary).entered();
                    let now = self.now();
                    self.log.present_meta(&summary_text(&view, now), &view, Some(self.meta()))?;
                }
                Effect::RenderProgress(frame) => self.render_progress(&frame)?,
                Effect::ShowIndicator => {
                    self.log.debug("progress indicator shown");
                    if telemetry::config::json_mode() {
                        self.log.result_meta(&IndicatorView { visible: true }, Some(self.meta()))?;
                    }
                }
                Effect::HideIndicator => {
                    self.log.debug("progress indicator hidden");
                    self.last_progress = None;
                    if telemetry::config::json_mode() {
                        self.log.result_meta(&IndicatorView { visible: false }, Some(self.meta()))?;
                    }
                }
            }
        }
        Ok(())
    }

    // Frames arrive every poll; only print when what a reader would see has changed.
    fn render_progress(&mut self, frame: &ProgressFrame) -> Result<()> {
        let key = (frame.pct, frame.outcome, frame.current);
        if self.last_progress == Some(key) {
            return Ok(());
        }
        self.last_progress = Some(key);
        let full = progress_text(frame);
        // while running, the step list only repeats what the headline says
        let text = if frame.active { full.lines().next().unwrap_or_default() } else { full.as_str() };
        self.log.present_meta(text, frame, Some(self.meta()))
    }

    fn meta(&self) -> Meta { Meta { duration_ms: None, run_id: Some(self.run_id.clone()) } }

    /// Returns false when the session should end.
    fn handle_line(&mut self, line: &str, timers: &mut Timers) -> Result<bool> {
        let cmd = match commands::parse(line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => return Ok(true),
            Err(e) => {
                self.log.warn(format!("{e}"));
                return Ok(true);
            }
        };
        // any typed command counts as user interaction; a blocked player may be usable now
        if !self.sound_ready && self.channels.sound.is_ready() {
            self.sound_ready = true;
            let effects = self.engine.on_sound_ready();
            self.apply(effects, timers)?;
        }
        let now = self.now();
        let effects = match cmd {
            Command::Quit => return Ok(false),
            Command::Help => {
                println!("{HELP}");
                Vec::new()
            }
            Command::Show => self.engine.set_visibility(true, now),
            Command::Hide => self.engine.set_visibility(false, now),
            Command::Summary => {
                match self.engine.open_summary(now) {
                    Some(view) => vec![Effect::ShowSummary(view)],
                    None => {
                        self.log.info("no buffered changes");
                        Vec::new()
                    }
                }
            }
            Command::Close => {
                self.engine.close_summary();
                Vec::new()
            }
            Command::Progress => {
                match self.engine.progress_frame(now) {
                    Some(frame) => self.log.present_meta(&progress_text(&frame), &frame, Some(self.meta()))?,
                    None => self.log.info("no progress observed yet"),
                }
                if let Some(status) = self.engine.status() {
                    let view = StatusView::new(status, now);
                    self.log.info(view.text());
                }
                self.log.info(format!("buffered batches={} pending alerts={}", self.engine.buffered_batches(), self.engine.alerts().len()));
                Vec::new()
            }
            Command::Ack(id) => {
                self.acknowledge(AckTarget::Alert(id), now);
                Vec::new()
            }
            Command::AckAgency(code) => {
                self.acknowledge(AckTarget::Agency(code), now);
                Vec::new()
            }
            Command::Start => {
                self.control(ControlAction::Start);
                Vec::new()
            }
            Command::Stop => {
                self.control(ControlAction::Stop);
                Vec::new()
            }
            Command::Run => {
                self.control(ControlAction::ManualRun);
                Vec::new()
            }
        };
        self.apply(effects, timers)?;
        Ok(true)
    }

    fn acknowledge(&mut self, target: AckTarget, now: i64) {
        let _s = self.log.span_kv(&Phase::Acknowledge, [("target", format!("{target:?}"))]).entered();
        let Some(ids) = self.engine.begin_ack(target.clone(), now) else { return };
        let backend = self.backend.clone();
        let tx = self.tx.clone();
        let log = telemetry::watch();
        tokio::spawn(async move {
            let mut accepted = Vec::with_capacity(ids.len());
            for id in ids {
                match backend.report_alert(id).await {
                    Ok(()) => accepted.push(id),
                    Err(e) => log.warn(format!("report of alert {id} failed: {e}")),
                }
            }
            let _ = tx.send(Inbound::Acked { target, accepted });
        });
    }

    fn control(&self, action: ControlAction) {
        let backend = self.backend.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = match action {
                ControlAction::Start => backend.start().await.map(|_| None),
                ControlAction::Stop => backend.stop().await.map(|_| None),
                ControlAction::ManualRun => backend.manual_iteration().await.map(Some),
            };
            let _ = tx.send(Inbound::Controlled { action, result });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockBackend;
    use crate::api::types::ActivityRecord;
    use crate::clock::Clock;
    use crate::notify::channels::fakes::{RecordingPush, RecordingSound};
    use crate::store::MemoryStore;

    /// Follows tokio's (paused) clock so engine timestamps and timers agree.
    struct TokioClock {
        origin: Instant,
        base: i64,
    }

    impl Clock for TokioClock {
        fn now_millis(&self) -> i64 { self.base + self.origin.elapsed().as_millis() as i64 }
    }

    fn dashboard(sales: f64) -> DashboardPayload {
        DashboardPayload {
            latest_activity: vec![ActivityRecord {
                agency_code: "A1".into(),
                agency_name: Some("North".into()),
                sales: Some(sales),
                balance: Some(10.0),
                time: None,
            }],
        }
    }

    fn status(total: i64) -> MonitoringStatus {
        MonitoringStatus { is_running: true, next_run_time: None, total_iterations: Some(total) }
    }

    fn runtime(backend: Arc<MockBackend>, sound: RecordingSound, push: RecordingPush) -> WatchRuntime {
        let settings = WatchSettings { refresh_interval: Duration::from_secs(1), ..Default::default() };
        let clock: SharedClock = Arc::new(TokioClock { origin: Instant::now(), base: 1_714_557_600_000 });
        let channels = Channels { sound: Box::new(sound), push: Arc::new(push) };
        WatchRuntime::new(backend, settings, Box::new(MemoryStore::new()), channels, clock)
    }

    #[tokio::test(start_paused = true)]
    async fn iteration_advance_reaches_sound_and_push() {
        let backend = Arc::new(MockBackend::new());
        backend.set_status(status(1));
        backend.set_dashboard(dashboard(100.0));
        backend.push_progress(JobProgressSnapshot { active: false, version: Some(1), ..Default::default() });
        let sound = RecordingSound::ready();
        let push = RecordingPush::default();
        let rt = runtime(backend.clone(), sound.clone(), push.clone());

        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(rt.run(cmd_rx, shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        backend.set_status(status(2));
        backend.set_dashboard(dashboard(160.0));
        tokio::time::sleep(Duration::from_millis(2_000)).await;

        cmd_tx.send("quit".into()).await.unwrap();
        handle.await.unwrap().unwrap();

        let sent = push.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].body, "1 changed • 0 newly alerting");
        assert_eq!(sound.plays(), 1);
        assert!(backend.calls().iter().any(|c| c == "progress"));
    }

    #[tokio::test(start_paused = true)]
    async fn acknowledgement_reports_every_alert_of_the_agency() {
        let backend = Arc::new(MockBackend::new());
        backend.set_status(status(1));
        backend.set_dashboard(dashboard(100.0));
        backend.set_alerts(vec![
            AlertRow { id: 7, agency_code: "A1".into(), ..Default::default() },
            AlertRow { id: 8, agency_code: "A1".into(), ..Default::default() },
        ]);
        backend.fail_report(8);
        let rt = runtime(backend.clone(), RecordingSound::default(), RecordingPush::default());

        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(rt.run(cmd_rx, shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(200)).await;
        cmd_tx.send("ack-agency A1".into()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown.cancel();
        handle.await.unwrap().unwrap();

        let calls = backend.calls();
        assert!(calls.contains(&"report:7".to_string()));
        assert!(calls.contains(&"report:8".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn hidden_start_skips_periodic_refresh_until_show() {
        let backend = Arc::new(MockBackend::new());
        backend.set_status(status(1));
        backend.set_dashboard(dashboard(100.0));
        let rt = runtime(backend.clone(), RecordingSound::default(), RecordingPush::default()).hidden(true);
        let dashboards = |b: &MockBackend| b.calls().iter().filter(|c| *c == "dashboard").count();

        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(rt.run(cmd_rx, shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        // only the startup load
        assert_eq!(dashboards(&backend), 1);

        cmd_tx.send("show".into()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        shutdown.cancel();
        handle.await.unwrap().unwrap();

        assert!(dashboards(&backend) >= 3);
    }
}
