use tracing::debug;

/// Emitted when the backend's completed-iteration counter rises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationAdvanced {
    pub total: i64,
}

/// Tracks `total_iterations` from the status feed. The first observation only initialises.
#[derive(Debug, Default)]
pub struct IterationCounter {
    last: Option<i64>,
}

impl IterationCounter {
    pub fn new() -> Self { Self::default() }

    pub fn observe(&mut self, total: Option<i64>) -> Option<IterationAdvanced> {
        let total = total?;
        match self.last {
            None => {
                debug!(total, "iteration counter initialised");
                self.last = Some(total);
                None
            }
            Some(prev) if total > prev => {
                self.last = Some(total);
                Some(IterationAdvanced { total })
            }
            Some(prev) => {
                // backend restarts reset the counter; follow it down without signalling
                if total < prev {
                    self.last = Some(total);
                }
                None
            }
        }
    }
}
