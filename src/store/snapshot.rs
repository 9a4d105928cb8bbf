use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::detect::types::EntitySnapshot;

use super::{KvStore, SNAPSHOT_KEY, load_json, save_json};

#[derive(Serialize, Deserialize)]
struct PersistedSnapshot {
    #[serde(default)]
    agencies: BTreeMap<String, EntitySnapshot>,
}

/// Per-entity last-known state. One generation per detection cycle, replaced wholesale.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    entities: BTreeMap<String, EntitySnapshot>,
    seeded: bool,
}

impl SnapshotStore {
    /// Restores the persisted generation. A readable entry counts as an existing baseline.
    pub fn load(store: &dyn KvStore) -> Self {
        match load_json::<PersistedSnapshot>(store, SNAPSHOT_KEY) {
            Some(p) => Self { entities: p.agencies, seeded: true },
            None => Self::default(),
        }
    }

    pub fn has_baseline(&self) -> bool { self.seeded || !self.entities.is_empty() }

    pub fn get(&self, entity_id: &str) -> Option<&EntitySnapshot> { self.entities.get(entity_id) }

    pub fn len(&self) -> usize { self.entities.len() }

    /// Swap in a new generation and persist it. Persistence failures are logged and ignored.
    pub fn replace(&mut self, frame: &[EntitySnapshot], store: &mut dyn KvStore) {
        self.entities = frame.iter().map(|s| (s.entity_id.clone(), s.clone())).collect();
        self.seeded = true;
        let persisted = PersistedSnapshot { agencies: self.entities.clone() };
        if let Err(e) = save_json(store, SNAPSHOT_KEY, &persisted) {
            warn!(error = %e, "failed to persist entity snapshot");
        }
    }
}
