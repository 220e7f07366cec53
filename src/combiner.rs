use chrono::{DateTime, Utc};

use crate::sources::KeySet;
use crate::types::{Record, Snapshot};

/// Counts describing one combination, for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CombineSummary {
    pub kept: usize,
    pub dropped_placeholders: usize,
    pub rewards: usize,
}

/// Merge listing records with rewards membership into a new snapshot.
///
/// Records without a valid Yes/No price pair are dropped. Every surviving
/// record is flagged `has_rewards = keys.contains(slug)`. Input order is kept.
/// Pure: the same inputs always produce the same snapshot.
pub fn combine(
    records: &[Record],
    keys: &KeySet,
    updated_at: DateTime<Utc>,
) -> (Snapshot, CombineSummary) {
    let mut summary = CombineSummary::default();

    let mut merged: Vec<Record> = Vec::with_capacity(records.len());

    for r in records {
        if !r.has_valid_prices() {
            summary.dropped_placeholders += 1;
            continue;
        }
        let has_rewards = keys.contains(&r.slug);
        if has_rewards {
            summary.rewards += 1;
        }
        merged.push(Record { has_rewards, ..r.clone() });
    }

    summary.kept = merged.len();
    (Snapshot::new(merged, updated_at), summary)
}
