use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};

// Backend timestamps arrive either as RFC3339 or as naive ISO strings in the backend's local
// time. Returns epoch milliseconds; None if unparseable.
pub fn parse_timestamp_millis(s: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc).timestamp_millis());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(nd) = NaiveDateTime::parse_from_str(s, fmt) {
            if let Some(dt) = Local.from_local_datetime(&nd).earliest() {
                return Some(dt.timestamp_millis());
            }
        }
    }
    None
}

pub fn parse_timestamp_opt(s: Option<&str>) -> Option<i64> {
    s.and_then(parse_timestamp_millis)
}

// "42s", "3m", "2h"; "--" when unknown.
pub fn format_ago(ms: Option<i64>) -> String {
    let Some(ms) = ms else { return "--".to_string() };
    let s = ms.max(0) / 1000;
    if s < 60 { return format!("{s}s"); }
    let m = s / 60;
    if m < 60 { return format!("{m}m"); }
    format!("{}h", m / 60)
}

// Run length for progress summaries: "12.3s" under 90 seconds, "4m 5s" beyond.
pub fn format_run_duration(ms: i64) -> String {
    let secs = ms as f64 / 1000.0;
    if secs < 90.0 {
        return format!("{secs:.1}s");
    }
    let total = secs.round() as i64;
    format!("{}m {}s", total / 60, total % 60)
}

// Countdown to the next scheduled run; "HH:MM:SS" once it exceeds an hour.
pub fn format_countdown(remaining_ms: i64) -> String {
    let total = (remaining_ms / 1000).max(0);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

pub fn format_delta(v: f64) -> String {
    if v > 0.0 { format!("+{}", trim_float(v)) } else { trim_float(v) }
}

pub fn format_delta_count(v: i64) -> String {
    if v > 0 { format!("+{v}") } else { v.to_string() }
}

fn trim_float(v: f64) -> String {
    if v.fract() == 0.0 { format!("{:.0}", v) } else { format!("{:.2}", v) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_with_offset() {
        let ms = parse_timestamp_millis("2024-05-01T10:00:00+00:00").unwrap();
        assert_eq!(ms, 1_714_557_600_000);
        assert_eq!(parse_timestamp_millis("2024-05-01T10:00:00Z"), Some(ms));
    }

    #[test]
    fn parses_naive_iso_and_rejects_garbage() {
        assert!(parse_timestamp_millis("2024-05-01T10:00:00.123456").is_some());
        assert!(parse_timestamp_millis("yesterday").is_none());
        assert!(parse_timestamp_opt(None).is_none());
    }

    #[test]
    fn ago_buckets() {
        assert_eq!(format_ago(None), "--");
        assert_eq!(format_ago(Some(42_000)), "42s");
        assert_eq!(format_ago(Some(180_000)), "3m");
        assert_eq!(format_ago(Some(2 * 3_600_000 + 5)), "2h");
    }

    #[test]
    fn run_duration_switches_to_minutes() {
        assert_eq!(format_run_duration(12_340), "12.3s");
        assert_eq!(format_run_duration(245_000), "4m 5s");
    }

    #[test]
    fn run_duration_carries_rounded_seconds_into_minutes() {
        assert_eq!(format_run_duration(119_600), "2m 0s");
        assert_eq!(format_run_duration(90_000), "1m 30s");
        assert_eq!(format_run_duration(179_499), "2m 59s");
    }

    #[test]
    fn countdown_clamps_and_pads() {
        assert_eq!(format_countdown(-5_000), "00:00");
        assert_eq!(format_countdown(125_000), "02:05");
        assert_eq!(format_countdown(3_725_000), "01:02:05");
    }

    #[test]
    fn deltas_carry_sign() {
        assert_eq!(format_delta(40.0), "+40");
        assert_eq!(format_delta(-2.5), "-2.50");
        assert_eq!(format_delta(0.0), "0");
        assert_eq!(format_delta_count(1), "+1");
    }
}
