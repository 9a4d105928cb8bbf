use std::env;

use crate::telemetry::config::json_mode;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub pretty: bool,
}

impl OutputConfig {
    /// `--json` wins; otherwise `WATCH_OUTPUT_FORMAT` / `WATCH_OUTPUT_PRETTY`.
    pub fn from_env() -> Self {
        Self::from_lookup(json_mode(), |k| env::var(k).ok())
    }

    pub fn from_lookup<F>(force_json: bool, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let format = match lookup("WATCH_OUTPUT_FORMAT").as_deref() {
            _ if force_json => OutputFormat::Json,
            Some("json") => OutputFormat::Json,
            _ => OutputFormat::Text,
        };
        let pretty = match lookup("WATCH_OUTPUT_PRETTY").as_deref() {
            Some(v) if v.eq_ignore_ascii_case("1") || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes") => true,
            _ => false,
        };
        OutputConfig { format, pretty }
    }
}
