use super::types::ChangeBatch;

/// Content signature of a batch: entity ids with their three deltas, plus the ids of newly
/// alerting entities. Independent of the order entries were produced in; ignores absolute values
/// and timestamps.
pub fn batch_signature(batch: &ChangeBatch) -> blake3::Hash {
    let mut changes: Vec<String> = batch
        .changes
        .iter()
        .map(|c| format!("{}:{}:{}:{}", c.entity_id, c.delta_sales, c.delta_balance, c.delta_alert_count))
        .collect();
    changes.sort();
    let mut new_ids: Vec<&str> = batch.new_entities.iter().map(|n| n.entity_id.as_str()).collect();
    new_ids.sort_unstable();

    let mut hasher = blake3::Hasher::new();
    for c in &changes {
        hasher.update(c.as_bytes());
        hasher.update(b"\x00");
    }
    hasher.update(b"|");
    for id in &new_ids {
        hasher.update(id.as_bytes());
        hasher.update(b"\x00");
    }
    hasher.finalize()
}
