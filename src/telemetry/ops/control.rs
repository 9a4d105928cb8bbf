use tracing::Span;
use tracing::info_span;

use crate::telemetry::ctx::{OpMarker, PhaseSpan};

#[derive(Copy, Clone, Debug)]
pub struct Control;

#[derive(Copy, Clone, Debug)]
pub enum Phase { Start, Stop, Manual }

impl PhaseSpan for Phase {
    fn name(&self) -> &'static str { match self { Phase::Start => "start", Phase::Stop => "stop", Phase::Manual => "manual" } }
    fn span(&self) -> Span { match self { Phase::Start => info_span!("start"), Phase::Stop => info_span!("stop"), Phase::Manual => info_span!("manual") } }
}

impl OpMarker for Control {
    const NAME: &'static str = "control";
    type Phase = Phase;
    fn root_span() -> Span { info_span!("control") }
}
