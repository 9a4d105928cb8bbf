use anyhow::Result;
use serde::Serialize;
use std::marker::PhantomData;
use tracing::{info, debug, warn, Span};

use super::config;
use crate::api::ApiError;
use crate::output::Emitter;
use crate::output::config::OutputConfig;
use crate::output::types::{Envelope, Meta};

pub trait PhaseSpan {
    fn name(&self) -> &'static str;
    fn span(&self) -> Span;
}

pub trait OpMarker {
    const NAME: &'static str;
    type Phase: PhaseSpan;
    fn root_span() -> Span;
}

pub struct LogCtx<O: OpMarker> {
    pub(crate) json: bool,
    pub(crate) _marker: PhantomData<O>,
}

impl<O: OpMarker> LogCtx<O> {
    fn op_name(&self) -> &'static str { O::NAME }

    pub fn root_span(&self) -> Span { O::root_span() }

    pub fn root_span_kv<'a, T>(&self, fields: T) -> Span
    where
        T: IntoIterator<Item = (&'a str, String)>,
    {
        let span = self.root_span();
        let details = kv_to_string(fields);
        if details.is_empty() {
            info!(op = %self.op_name(), "start");
        } else {
            info!(op = %self.op_name(), details = %details, "start");
        }
        span
    }

    pub fn span(&self, ph: &O::Phase) -> Span { ph.span() }

    pub fn span_kv<'a, T>(&self, ph: &O::Phase, fields: T) -> Span
    where
        T: IntoIterator<Item = (&'a str, String)>,
    {
        let span = self.span(ph);
        let details = kv_to_string(fields);
        if details.is_empty() {
            info!(op = %self.op_name(), phase = ph.name(), "span_start");
        } else {
            info!(op = %self.op_name(), phase = ph.name(), details = %details, "span_start");
        }
        span
    }

    pub fn info(&self, msg: impl AsRef<str>) { if self.json { info!(op = %self.op_name(), "{}", msg.as_ref()); } else { info!("{}", msg.as_ref()); } }
    pub fn debug(&self, msg: impl AsRef<str>) { if self.json { debug!(op = %self.op_name(), "{}", msg.as_ref()); } else { debug!("{}", msg.as_ref()); } }
    pub fn warn(&self, msg: impl AsRef<str>) { if self.json { warn!(op = %self.op_name(), "{}", msg.as_ref()); } else { warn!("{}", msg.as_ref()); } }

    pub fn info_kv<'a, D>(&self, msg: &str, kv: D)
    where
        D: IntoIterator<Item = (&'a str, String)>,
    {
        if self.json { let details = kv_to_string(kv); info!(op = %self.op_name(), details = %details, "{}", msg); }
        else { info!("{}", msg); }
    }

    pub fn plan<T: Serialize>(&self, plan: &T) -> Result<()> { emit(&Envelope::plan(self.op_name(), plan, None)?) }
    pub fn result_meta<T: Serialize>(&self, result: &T, meta: Option<Meta>) -> Result<()> { emit(&Envelope::result(self.op_name(), result, meta)?) }

    /// User-facing output: the envelope in `--json` mode, otherwise the text on stdout.
    pub fn present_meta<T: Serialize>(&self, text: &str, result: &T, meta: Option<Meta>) -> Result<()> {
        if config::json_mode() {
            self.result_meta(result, meta)
        } else {
            println!("{text}");
            Ok(())
        }
    }
}

impl LogCtx<crate::telemetry::ops::watch::Watch> {
    /// Failed polls retry on the next tick; only errors a retry cannot fix are warnings.
    pub fn poll_failed(&self, endpoint: &str, err: &ApiError) {
        if err.is_retryable() {
            if self.json { debug!(op = %self.op_name(), endpoint, error = %err, "poll_failed"); }
            else { debug!("poll {} failed: {}", endpoint, err); }
        } else if self.json {
            warn!(op = %self.op_name(), endpoint, error = %err, "poll_failed");
        } else {
            warn!("⚠️  poll {} failed: {}", endpoint, err);
        }
    }
}

fn emit(env: &Envelope) -> Result<()> {
    let cfg = OutputConfig::from_env();
    Emitter::from_env(cfg).emit(env)?;
    Ok(())
}

fn kv_to_string<'a, T>(kv: T) -> String
where
    T: IntoIterator<Item = (&'a str, String)>,
{
    let mut parts: Vec<String> = Vec::new();
    for (k, v) in kv { parts.push(format!("{}={}", k, v)); }
    parts.join(" ")
}
