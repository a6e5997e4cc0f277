//! Natural-key deduplication of a run's records.

use std::collections::HashMap;

use crate::schema::{CanonicalRecord, NaturalKey};

/// Deduplicated records plus how many were collapsed.
#[derive(Debug, Default)]
pub struct Deduplicated {
    pub records: Vec<CanonicalRecord>,
    pub duplicates: usize,
}

/// Collapse records sharing a natural key. The last observation wins; the
/// surviving record keeps the position of the key's first appearance.
pub fn deduplicate(records: Vec<CanonicalRecord>) -> Deduplicated {
    let mut index: HashMap<NaturalKey, usize> = HashMap::with_capacity(records.len());
    let mut unique: Vec<CanonicalRecord> = Vec::with_capacity(records.len());
    let mut duplicates = 0;

    for record in records {
        match index.get(&record.natural_key()) {
            Some(&pos) => {
                unique[pos] = record;
                duplicates += 1;
            }
            None => {
                index.insert(record.natural_key(), unique.len());
                unique.push(record);
            }
        }
    }

    Deduplicated {
        records: unique,
        duplicates,
    }
}
