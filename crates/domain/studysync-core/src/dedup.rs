use crate::model::{DataSnapshot, EntityOrigin, SyncEntity};

/// Two entities describe the same fact when all semantic fields match.
/// Identifiers, timestamps and presentation flags are ignored.
pub fn is_duplicate<T: SyncEntity>(a: &T, b: &T) -> bool {
    a.semantic_fields() == b.semantic_fields()
}

/// For two entities that share an identifier, whether the content diverged.
pub fn has_changes<T: SyncEntity>(a: &T, b: &T) -> bool {
    !is_duplicate(a, b)
}

/// First item in `candidates` that is a duplicate of `item`.
pub fn find_duplicate<'a, T: SyncEntity>(item: &T, candidates: &'a [T]) -> Option<&'a T> {
    let key = item.semantic_fields();
    candidates.iter().find(|c| c.semantic_fields() == key)
}

/// Remote rows, except where a synced local copy carries edits the remote
/// has not seen, plus local items that never reached the remote.
fn keep_pending<T: SyncEntity>(local: &[T], remote: Vec<T>) -> Vec<T> {
    let mut merged: Vec<T> = remote
        .into_iter()
        .map(|row| {
            local
                .iter()
                .find(|l| {
                    l.origin() == EntityOrigin::Synced && l.id() == row.id() && has_changes(*l, &row)
                })
                .cloned()
                .unwrap_or(row)
        })
        .collect();
    let pending: Vec<T> = local
        .iter()
        .filter(|l| l.origin() == EntityOrigin::Local && find_duplicate(*l, &merged).is_none())
        .cloned()
        .collect();
    merged.extend(pending);
    merged
}

/// Replace local content with a downloaded snapshot. Local items the remote
/// has no copy of are kept, and so are unpushed edits to synced items.
/// Remote settings win when present.
pub fn merge_remote(local: &DataSnapshot, remote: DataSnapshot) -> DataSnapshot {
    DataSnapshot {
        records: keep_pending(&local.records, remote.records),
        plans: keep_pending(&local.plans, remote.plans),
        knowledge: keep_pending(&local.knowledge, remote.knowledge),
        settings: remote.settings.or_else(|| local.settings.clone()),
    }
}
