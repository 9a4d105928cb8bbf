use tracing::debug;

/// Slack added after a window closes before the deferred detection runs.
const DEFER_SLACK_MS: i64 = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// No window is open; detect now.
    Proceed,
    /// A window is open and work is pending; detection will run at `fire_at`.
    Deferred { fire_at: i64 },
    /// A window is open but there is nothing to detect.
    Skipped,
}

/// Short veto window armed by local writes (acknowledgements) so their own effect on the
/// alert counts is not reported back as a detected change.
#[derive(Debug, Default)]
pub struct SuspensionController {
    until: Option<i64>,
    deferred_at: Option<i64>,
}

impl SuspensionController {
    pub fn new() -> Self { Self::default() }

    /// Arm or extend the window to at least `now + duration_ms`.
    pub fn suspend(&mut self, now: i64, duration_ms: i64) {
        let end = now + duration_ms.max(0);
        let until = self.until.map_or(end, |u| u.max(end));
        self.until = Some(until);
        // an already scheduled run moves with the window
        if self.deferred_at.is_some() {
            self.deferred_at = Some(until + DEFER_SLACK_MS);
        }
        debug!(until, "detection suspended");
    }

    pub fn is_suspended(&self, now: i64) -> bool { self.until.is_some_and(|u| now < u) }

    /// Decide what a detection attempt at `now` does. At most one deferred run exists.
    pub fn admit(&mut self, now: i64, pending_advance: bool) -> Admission {
        let Some(until) = self.until.filter(|_| self.is_suspended(now)) else {
            self.until = None;
            return Admission::Proceed;
        };
        if !pending_advance {
            return Admission::Skipped;
        }
        let fire_at = until + DEFER_SLACK_MS;
        self.deferred_at = Some(fire_at);
        Admission::Deferred { fire_at }
    }

    /// True once when a deferred run has come due.
    pub fn take_due(&mut self, now: i64) -> bool {
        match self.deferred_at {
            Some(at) if now >= at => {
                self.deferred_at = None;
                if self.until.is_some_and(|u| now >= u) {
                    self.until = None;
                }
                true
            }
            _ => false,
        }
    }

    pub fn next_deadline(&self) -> Option<i64> { self.deferred_at }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deferred_call_fires_after_window() {
        let mut s = SuspensionController::new();
        s.suspend(0, 2_000);
        assert_eq!(s.admit(500, true), Admission::Deferred { fire_at: 2_080 });
        assert!(!s.take_due(2_000));
        assert!(s.take_due(2_080));
        assert!(!s.take_due(3_000));
        assert_eq!(s.admit(3_000, true), Admission::Proceed);
    }

    #[test]
    fn without_pending_work_the_call_is_skipped() {
        let mut s = SuspensionController::new();
        s.suspend(0, 2_000);
        assert_eq!(s.admit(100, false), Admission::Skipped);
        assert_eq!(s.next_deadline(), None);
    }

    #[test]
    fn repeated_attempts_keep_a_single_deferred_run() {
        let mut s = SuspensionController::new();
        s.suspend(0, 1_000);
        s.admit(100, true);
        s.admit(200, true);
        assert_eq!(s.next_deadline(), Some(1_080));
    }

    #[test]
    fn extending_the_window_moves_the_deferred_run() {
        let mut s = SuspensionController::new();
        s.suspend(0, 2_000);
        s.admit(500, true);
        s.suspend(1_000, 2_500);
        assert_eq!(s.next_deadline(), Some(3_580));
        // shorter re-arm does not shrink it
        s.suspend(1_100, 100);
        assert!(s.is_suspended(3_000));
    }
}
