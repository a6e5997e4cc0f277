//! Batched, idempotent writes.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::schema::CanonicalRecord;
use crate::storage::{ConflictPolicy, MetricStore};

pub const MIN_BATCH_SIZE: usize = 500;
pub const MAX_BATCH_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertReport {
    pub submitted: usize,
    /// Rows the store reports as affected
    pub written: u64,
    pub batches: usize,
    pub failed_batches: usize,
    pub failed_rows: usize,
}

pub struct Upserter {
    store: Arc<dyn MetricStore>,
    batch_size: usize,
}

impl Upserter {
    /// `batch_size` is clamped to 500..=1000 rows.
    pub fn new(store: Arc<dyn MetricStore>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Write `records` batch by batch. A failed batch is logged and counted;
    /// batches before and after it are unaffected.
    pub async fn upsert(&self, records: &[CanonicalRecord], policy: ConflictPolicy) -> UpsertReport {
        let mut report = UpsertReport {
            submitted: records.len(),
            ..Default::default()
        };

        for (n, batch) in records.chunks(self.batch_size).enumerate() {
            report.batches += 1;
            match self.store.upsert_batch(batch, policy).await {
                Ok(affected) => {
                    debug!(batch = n, rows = batch.len(), affected, "Batch written");
                    report.written += affected;
                }
                Err(e) => {
                    warn!(batch = n, rows = batch.len(), "Batch write failed: {}", e);
                    report.failed_batches += 1;
                    report.failed_rows += batch.len();
                }
            }
        }
        report
    }
}
