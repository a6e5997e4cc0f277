//! In-process metric store with the same key semantics as the database.
//! Used by tests and by dry experiments without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::traits::{ConflictPolicy, MetricStore, StoreError, StoreResult};
use crate::backfill::RunSummary;
use crate::schema::{CanonicalRecord, NaturalKey};

#[derive(Default)]
pub struct InMemoryStore {
    rows: Mutex<HashMap<NaturalKey, CanonicalRecord>>,
    runs: Mutex<Vec<RunSummary>>,
    batch_calls: AtomicUsize,
    failing_batches: Mutex<HashSet<usize>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the given batch calls (0-based, counted across the store's
    /// lifetime) fail with `StoreError::Unavailable`.
    pub fn fail_batches(&self, calls: impl IntoIterator<Item = usize>) {
        self.failing_batches.lock().extend(calls);
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }

    pub fn get(&self, key: &NaturalKey) -> Option<CanonicalRecord> {
        self.rows.lock().get(key).cloned()
    }

    pub fn runs(&self) -> Vec<RunSummary> {
        self.runs.lock().clone()
    }

    /// Number of `upsert_batch` calls, failed ones included.
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetricStore for InMemoryStore {
    async fn upsert_batch(
        &self,
        records: &[CanonicalRecord],
        policy: ConflictPolicy,
    ) -> StoreResult<u64> {
        let call = self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_batches.lock().contains(&call) {
            return Err(StoreError::Unavailable(format!("injected failure on batch {}", call)));
        }
        if let Some(bad) = records.iter().find(|r| !r.value.is_finite()) {
            return Err(StoreError::InvalidData(format!(
                "non-finite value for {}/{}",
                bad.asset_id, bad.metric_name
            )));
        }

        let mut rows = self.rows.lock();
        let mut affected = 0u64;
        for record in records {
            let key = record.natural_key();
            match (rows.get_mut(&key), policy) {
                (None, _) => {
                    rows.insert(key, record.clone());
                    affected += 1;
                }
                (Some(_), ConflictPolicy::Preserve) => {}
                (Some(existing), ConflictPolicy::Refresh) => {
                    existing.value = record.value;
                    if record.entity_id.is_some() {
                        existing.entity_id = record.entity_id;
                    }
                    affected += 1;
                }
            }
        }
        Ok(affected)
    }

    async fn record_run(&self, summary: &RunSummary) -> StoreResult<()> {
        self.runs.lock().push(summary.clone());
        Ok(())
    }

    async fn latest_timestamp(&self, source: &str) -> StoreResult<Option<DateTime<Utc>>> {
        Ok(self
            .rows
            .lock()
            .values()
            .filter(|r| r.source == source)
            .map(|r| r.timestamp)
            .max())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Granularity;
    use chrono::TimeZone;

    fn rec(value: f64) -> CanonicalRecord {
        CanonicalRecord::new(
            "coingecko",
            "bitcoin",
            "PRICE",
            value,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Granularity::Daily,
        )
    }

    #[tokio::test]
    async fn test_preserve_keeps_existing_value() {
        let store = InMemoryStore::new();
        assert_eq!(store.upsert_batch(&[rec(1.0)], ConflictPolicy::Preserve).await.unwrap(), 1);
        assert_eq!(store.upsert_batch(&[rec(2.0)], ConflictPolicy::Preserve).await.unwrap(), 0);
        assert_eq!(store.get(&rec(0.0).natural_key()).unwrap().value, 1.0);
    }

    #[tokio::test]
    async fn test_refresh_overwrites_existing_value() {
        let store = InMemoryStore::new();
        store.upsert_batch(&[rec(1.0)], ConflictPolicy::Refresh).await.unwrap();
        assert_eq!(store.upsert_batch(&[rec(2.0)], ConflictPolicy::Refresh).await.unwrap(), 1);
        assert_eq!(store.get(&rec(0.0).natural_key()).unwrap().value, 2.0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_injected_failure_writes_nothing() {
        let store = InMemoryStore::new();
        store.fail_batches([0]);
        assert!(store.upsert_batch(&[rec(1.0)], ConflictPolicy::Preserve).await.is_err());
        assert!(store.is_empty());
        assert_eq!(store.upsert_batch(&[rec(1.0)], ConflictPolicy::Preserve).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_latest_timestamp_per_source() {
        let store = InMemoryStore::new();
        assert_eq!(store.latest_timestamp("coingecko").await.unwrap(), None);
        store.upsert_batch(&[rec(1.0)], ConflictPolicy::Preserve).await.unwrap();
        assert_eq!(
            store.latest_timestamp("coingecko").await.unwrap(),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(store.latest_timestamp("velo").await.unwrap(), None);
    }
}
