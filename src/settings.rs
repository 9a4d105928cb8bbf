use std::time::Duration;

const DEFAULT_SUMMARY_COOLDOWN_MS: u64 = 10_000;
const DEFAULT_AUTO_SHOW_GRACE_MS: u64 = 20_000;
const DEFAULT_PUSH_SPACING_MS: u64 = 3_000;
const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 900;
const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 30;
const DEFAULT_INDICATOR_HIDE_MS: u64 = 25_000;
const DEFAULT_PROGRESS_RECENCY_SECS: u64 = 5 * 60;
const DEFAULT_ACK_SUSPEND_MS: u64 = 2_000;
const DEFAULT_ACK_AGENCY_SUSPEND_MS: u64 = 2_500;
const DEFAULT_FOREGROUND_DEBOUNCE_MS: u64 = 1_500;
const DEFAULT_RECENT_ACK_TTL_MS: u64 = 3_000;

/// User-facing switches and timing knobs for the watch engine.
#[derive(Clone, Debug, PartialEq)]
pub struct WatchSettings {
    pub auto_show_summary: bool,
    pub enable_push: bool,
    pub enable_sound: bool,
    pub summary_cooldown: Duration,
    pub auto_show_grace: Duration,
    pub push_spacing: Duration,
    pub progress_interval: Duration,
    pub refresh_interval: Duration,
    pub indicator_hide_after: Duration,
    pub progress_recency: Duration,
    pub ack_suspend: Duration,
    pub ack_agency_suspend: Duration,
    pub foreground_refresh_debounce: Duration,
    pub recently_acknowledged_ttl: Duration,
    pub push_webhook: Option<String>,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            auto_show_summary: true,
            enable_push: true,
            enable_sound: true,
            summary_cooldown: Duration::from_millis(DEFAULT_SUMMARY_COOLDOWN_MS),
            auto_show_grace: Duration::from_millis(DEFAULT_AUTO_SHOW_GRACE_MS),
            push_spacing: Duration::from_millis(DEFAULT_PUSH_SPACING_MS),
            progress_interval: Duration::from_millis(DEFAULT_PROGRESS_INTERVAL_MS),
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            indicator_hide_after: Duration::from_millis(DEFAULT_INDICATOR_HIDE_MS),
            progress_recency: Duration::from_secs(DEFAULT_PROGRESS_RECENCY_SECS),
            ack_suspend: Duration::from_millis(DEFAULT_ACK_SUSPEND_MS),
            ack_agency_suspend: Duration::from_millis(DEFAULT_ACK_AGENCY_SUSPEND_MS),
            foreground_refresh_debounce: Duration::from_millis(DEFAULT_FOREGROUND_DEBOUNCE_MS),
            recently_acknowledged_ttl: Duration::from_millis(DEFAULT_RECENT_ACK_TTL_MS),
            push_webhook: None,
        }
    }
}

impl WatchSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Overlay `WATCH_*` values onto the defaults. Unparsable values are ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(v) = lookup("WATCH_AUTO_SHOW_SUMMARY").and_then(|v| parse_flag(&v)) { cfg.auto_show_summary = v; }
        if let Some(v) = lookup("WATCH_ENABLE_PUSH").and_then(|v| parse_flag(&v)) { cfg.enable_push = v; }
        if let Some(v) = lookup("WATCH_ENABLE_SOUND").and_then(|v| parse_flag(&v)) { cfg.enable_sound = v; }
        if let Some(v) = lookup("WATCH_SUMMARY_COOLDOWN_MS").and_then(|v| v.parse::<u64>().ok()) {
            cfg.summary_cooldown = Duration::from_millis(v);
        }
        if let Some(v) = lookup("WATCH_AUTO_SHOW_GRACE_MS").and_then(|v| v.parse::<u64>().ok()) {
            cfg.auto_show_grace = Duration::from_millis(v);
        }
        if let Some(v) = lookup("WATCH_PROGRESS_INTERVAL_MS").and_then(|v| v.parse::<u64>().ok()) {
            if v > 0 { cfg.progress_interval = Duration::from_millis(v); }
        }
        if let Some(v) = lookup("WATCH_REFRESH_INTERVAL_SECS").and_then(|v| v.parse::<u64>().ok()) {
            if v > 0 { cfg.refresh_interval = Duration::from_secs(v); }
        }
        if let Some(v) = lookup("WATCH_INDICATOR_HIDE_MS").and_then(|v| v.parse::<u64>().ok()) {
            cfg.indicator_hide_after = Duration::from_millis(v);
        }
        if let Some(url) = lookup("WATCH_PUSH_WEBHOOK") {
            let url = url.trim().to_string();
            if !url.is_empty() { cfg.push_webhook = Some(url); }
        }
        cfg
    }
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
