//! Merging a run's records into a master dataset.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use crime_log_source_models::IncidentRecord;

/// Merges `incoming` into `existing`.
///
/// Records are unique on `(case_number, reported_at)`. When both sides
/// hold a key, the incoming record replaces the existing one, except that
/// a coordinate the existing record already had is kept if the incoming
/// one has none. The result is sorted by `reported_at` descending; ties
/// keep incoming records ahead of existing ones.
///
/// Applying the same `incoming` twice yields the same dataset as applying
/// it once.
#[must_use]
pub fn reconcile(
    existing: Vec<IncidentRecord>,
    incoming: Vec<IncidentRecord>,
) -> Vec<IncidentRecord> {
    let mut index: BTreeMap<(String, NaiveDateTime), usize> = BTreeMap::new();
    let mut merged: Vec<IncidentRecord> = Vec::with_capacity(existing.len() + incoming.len());

    for record in incoming.into_iter().chain(existing) {
        let key = (record.case_number.clone(), record.reported_at);
        if let Some(&kept) = index.get(&key) {
            carry_location(&mut merged[kept], &record);
        } else {
            index.insert(key, merged.len());
            merged.push(record);
        }
    }

    merged.sort_by(|a, b| b.reported_at.cmp(&a.reported_at));
    merged
}

fn carry_location(kept: &mut IncidentRecord, dropped: &IncidentRecord) {
    if kept.has_coordinates() || !dropped.has_coordinates() {
        return;
    }
    kept.latitude = dropped.latitude;
    kept.longitude = dropped.longitude;
    if kept.neighborhood.is_none() {
        kept.neighborhood.clone_from(&dropped.neighborhood);
    }
    if kept.city.is_none() {
        kept.city.clone_from(&dropped.city);
    }
}
