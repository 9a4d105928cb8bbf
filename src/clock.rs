use std::sync::Arc;
#[cfg(test)]
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Millisecond wall-clock source. The engine never reads time any other way.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

pub type SharedClock = Arc<dyn Clock>;

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 { Utc::now().timestamp_millis() }
}

/// Settable clock for deterministic tests. Clones share the same instant.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

#[cfg(test)]
impl ManualClock {
    pub fn at(millis: i64) -> Self {
        Self { now: Arc::new(AtomicI64::new(millis)) }
    }

    pub fn set(&self, millis: i64) { self.now.store(millis, Ordering::SeqCst); }

    pub fn advance(&self, millis: i64) { self.now.fetch_add(millis, Ordering::SeqCst); }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now_millis(&self) -> i64 { self.now.load(Ordering::SeqCst) }
}
