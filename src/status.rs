use std::time::Instant;

use anyhow::{Context, Result};

use crate::api::MonitorBackend;
use crate::clock::Clock;
use crate::engine::render::{StatusView, progress_text};
use crate::output::types::Meta;
use crate::progress::ProgressTracker;
use crate::settings::WatchSettings;
use crate::store::MemoryStore;
use crate::telemetry::{self};
use crate::telemetry::ops::progress::Phase as ProgressPhase;
use crate::telemetry::ops::status::Phase as StatusPhase;

pub async fn run(backend: &dyn MonitorBackend, clock: &dyn Clock) -> Result<()> {
    let log = telemetry::status();
    let _g = log.root_span().entered();
    let t0 = Instant::now();

    let status = {
        let _s = log.span(&StatusPhase::Fetch).entered();
        backend.status().await.context("fetch monitoring status")?
    };
    let view = StatusView::new(&status, clock.now_millis());
    let meta = Meta { duration_ms: Some(t0.elapsed().as_millis()), run_id: None };
    log.present_meta(&view.text(), &view, Some(meta))
}

/// One progress poll rendered as a single frame.
pub async fn progress(backend: &dyn MonitorBackend, clock: &dyn Clock, settings: &WatchSettings) -> Result<()> {
    let log = telemetry::progress();
    let _g = log.root_span().entered();
    let t0 = Instant::now();

    let snap = {
        let _s = log.span(&ProgressPhase::Fetch).entered();
        backend.progress().await.context("fetch job progress")?
    };

    let _s = log.span(&ProgressPhase::Render).entered();
    let mut tracker = ProgressTracker::new(
        settings.indicator_hide_after.as_millis() as i64,
        settings.progress_recency.as_millis() as i64,
    );
    // a single look at the job must not touch the watcher's persisted run memo
    let mut scratch = MemoryStore::new();
    let Some(frame) = tracker.observe(snap, clock.now_millis(), &mut scratch).frame else {
        log.info("no progress reported");
        return Ok(());
    };
    let meta = Meta { duration_ms: Some(t0.elapsed().as_millis()), run_id: None };
    log.present_meta(&progress_text(&frame), &frame, Some(meta))
}
