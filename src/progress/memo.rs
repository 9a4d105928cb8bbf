use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::store::{KvStore, PROGRESS_KEY, load_json, save_json};

/// Last finished run, kept so a restart inside the recency window can show it again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressMemo {
    pub pct: u8,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub finished_at: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    pub ts: i64,
}

impl ProgressMemo {
    pub fn load(store: &dyn KvStore) -> Option<Self> { load_json(store, PROGRESS_KEY) }

    pub fn save(&self, store: &mut dyn KvStore) {
        if let Err(e) = save_json(store, PROGRESS_KEY, self) {
            warn!(error = %e, "failed to persist progress state");
        }
    }

    pub fn clear(store: &mut dyn KvStore) {
        if let Err(e) = store.remove(PROGRESS_KEY) {
            warn!(error = %e, "failed to clear progress state");
        }
    }

    /// Restorable only when the run completed and was recorded less than `recency_ms` ago.
    pub fn is_restorable(&self, now: i64, recency_ms: i64) -> bool {
        self.pct == 100 && now - self.ts < recency_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn memo(pct: u8, ts: i64) -> ProgressMemo {
        ProgressMemo { pct, started_at: None, finished_at: None, status: Some("success".into()), ts }
    }

    #[test]
    fn restorable_within_window_only() {
        assert!(memo(100, 1_000).is_restorable(1_000 + 299_999, 300_000));
        assert!(!memo(100, 1_000).is_restorable(1_000 + 300_000, 300_000));
        assert!(!memo(99, 1_000).is_restorable(1_001, 300_000));
    }

    #[test]
    fn persisted_memo_round_trips_through_store() {
        let mut kv = MemoryStore::new();
        memo(100, 5).save(&mut kv);
        assert_eq!(ProgressMemo::load(&kv), Some(memo(100, 5)));
        ProgressMemo::clear(&mut kv);
        assert!(ProgressMemo::load(&kv).is_none());
    }
}
