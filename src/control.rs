use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::api::MonitorBackend;
use crate::api::types::ManualIterationResult;
use crate::engine::ControlAction;
use crate::output::types::Meta;
use crate::telemetry;
use crate::telemetry::ops::control::Phase;

#[derive(Debug, Serialize)]
struct ControlReport {
    action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    manual: Option<ManualIterationResult>,
}

impl ControlReport {
    fn text(&self) -> String {
        match &self.manual {
            Some(m) => format!(
                "▶️  Manual iteration — success={} agencies={} alerts={}",
                m.success,
                m.agencies_processed.unwrap_or(0),
                m.alerts_generated.unwrap_or(0)
            ),
            None => format!("✅ Monitoring {}", self.action),
        }
    }
}

/// Start/stop the backend job or trigger one iteration right away.
pub async fn run(backend: &dyn MonitorBackend, action: ControlAction) -> Result<()> {
    let log = telemetry::control();
    let _g = log.root_span_kv([("action", format!("{action:?}"))]).entered();
    let t0 = Instant::now();

    let report = match action {
        ControlAction::Start => {
            let _s = log.span(&Phase::Start).entered();
            backend.start().await.context("start monitoring")?;
            ControlReport { action: "started", manual: None }
        }
        ControlAction::Stop => {
            let _s = log.span(&Phase::Stop).entered();
            backend.stop().await.context("stop monitoring")?;
            ControlReport { action: "stopped", manual: None }
        }
        ControlAction::ManualRun => {
            let _s = log.span(&Phase::Manual).entered();
            let result = backend.manual_iteration().await.context("run manual iteration")?;
            if !result.success {
                log.warn("manual iteration reported failure");
            }
            ControlReport { action: "manual", manual: Some(result) }
        }
    };
    let meta = Meta { duration_ms: Some(t0.elapsed().as_millis()), run_id: None };
    log.present_meta(&report.text(), &report, Some(meta))
}
