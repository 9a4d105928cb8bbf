use tracing::{info_span, Span};

use crate::telemetry::ctx::{OpMarker, PhaseSpan};

#[derive(Copy, Clone, Debug)]
pub struct Watch;

#[derive(Copy, Clone, Debug)]
pub enum Phase {
    Dashboard,
    Alerts,
    Status,
    Progress,
    Detect,
    Notify,
    Summary,
    Acknowledge,
}

impl PhaseSpan for Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::Dashboard => "dashboard",
            Phase::Alerts => "alerts",
            Phase::Status => "status",
            Phase::Progress => "progress",
            Phase::Detect => "detect",
            Phase::Notify => "notify",
            Phase::Summary => "summary",
            Phase::Acknowledge => "acknowledge",
        }
    }

    fn span(&self) -> Span {
        match self {
            Phase::Dashboard => info_span!("dashboard"),
            Phase::Alerts => info_span!("alerts"),
            Phase::Status => info_span!("status"),
            Phase::Progress => info_span!("progress"),
            Phase::Detect => info_span!("detect"),
            Phase::Notify => info_span!("notify"),
            Phase::Summary => info_span!("summary"),
            Phase::Acknowledge => info_span!("acknowledge"),
        }
    }
}

impl OpMarker for Watch {
    const NAME: &'static str = "watch";
    type Phase = Phase;

    fn root_span() -> Span {
        info_span!("watch")
    }
}
