use super::types::{ProgressStep, StepKey, StepStatus};

const RUNNING_CEILING: f64 = 0.85;
const RUNNING_FLOOR: f64 = 0.05;
const FALLBACK_EXPECTED_SECS: f64 = 15.0;

/// Share of a running step's weight credited after `elapsed_ms`, in `[0.05, 0.85]`.
/// Never decreases as `elapsed_ms` grows.
pub fn running_fraction(key: StepKey, elapsed_ms: i64) -> f64 {
    let est = key.expected_secs().unwrap_or(FALLBACK_EXPECTED_SECS);
    let elapsed = (elapsed_ms.max(0) as f64) / 1000.0;
    let frac = ((elapsed / est) * RUNNING_CEILING).clamp(0.0, RUNNING_CEILING);
    frac.max(RUNNING_FLOOR)
}

/// Completion in percent (0.0..=100.0). Every step but `complete` weighs the same; terminal
/// steps count fully, running steps by elapsed-time extrapolation, pending steps not at all.
pub fn completion_percent(steps: &[ProgressStep], now: i64) -> f64 {
    let weighted: Vec<&ProgressStep> = steps.iter().filter(|s| s.key.is_weighted()).collect();
    if weighted.is_empty() {
        return 0.0;
    }
    let done: f64 = weighted
        .iter()
        .map(|s| match s.status {
            status if status.is_terminal() => 1.0,
            StepStatus::Running => {
                let elapsed = s.started_at.map_or(0, |t| now - t);
                running_fraction(s.key, elapsed)
            }
            _ => 0.0,
        })
        .sum();
    ((done / weighted.len() as f64) * 100.0).min(100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(key: StepKey, status: StepStatus, started_at: Option<i64>) -> ProgressStep {
        ProgressStep { key, status, started_at, finished_at: None, error_message: None }
    }

    fn all(status_for: impl Fn(StepKey) -> StepStatus) -> Vec<ProgressStep> {
        StepKey::ORDER.iter().map(|k| step(*k, status_for(*k), Some(0))).collect()
    }

    #[test]
    fn running_fraction_is_floored_clamped_and_monotonic() {
        assert_eq!(running_fraction(StepKey::Chance, 0), 0.05);
        assert_eq!(running_fraction(StepKey::Chance, -5_000), 0.05);
        let at2 = running_fraction(StepKey::Chance, 2_000);
        let at10 = running_fraction(StepKey::Chance, 10_000);
        assert!(at10 >= at2);
        assert!((at10 - 0.425).abs() < 1e-9);
        assert_eq!(running_fraction(StepKey::Chance, 600_000), 0.85);
    }

    #[test]
    fn success_snaps_to_full_weight() {
        let running = vec![step(StepKey::Login, StepStatus::Running, Some(0))];
        let done = vec![step(StepKey::Login, StepStatus::Success, Some(0))];
        let before = completion_percent(&running, 17_000);
        let after = completion_percent(&done, 17_000);
        assert_eq!(after, 100.0);
        assert!(after >= before);
    }

    #[test]
    fn complete_step_carries_no_weight() {
        let steps = all(|k| if k == StepKey::Complete { StepStatus::Pending } else { StepStatus::Success });
        assert_eq!(completion_percent(&steps, 0), 100.0);
        let none = all(|_| StepStatus::Pending);
        assert_eq!(completion_percent(&none, 0), 0.0);
    }

    #[test]
    fn errors_count_as_finished() {
        let steps = all(|k| match k {
            StepKey::Login | StepKey::Navigate | StepKey::BaseFilters => StepStatus::Success,
            StepKey::Chance => StepStatus::Error,
            _ => StepStatus::Pending,
        });
        let pct = completion_percent(&steps, 0);
        assert!((pct - 400.0 / 7.0).abs() < 1e-9);
    }
}
