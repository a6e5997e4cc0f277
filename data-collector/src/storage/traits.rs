//! Store abstraction used by the upserter and the run ledger.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

use crate::backfill::RunSummary;
use crate::schema::CanonicalRecord;
use collector_common::error::{DatabaseError, ErrorCategory, ErrorClassification};

/// Storage errors
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(DatabaseError::from(err))
    }
}

impl ErrorClassification for StoreError {
    fn category(&self) -> ErrorCategory {
        match self {
            StoreError::Database(err) => err.category(),
            StoreError::Unavailable(_) => ErrorCategory::Transient,
            StoreError::InvalidData(_) => ErrorCategory::Permanent,
        }
    }

    fn suggested_retry_delay(&self) -> Option<Duration> {
        match self {
            StoreError::Database(err) => err.suggested_retry_delay(),
            StoreError::Unavailable(_) => Some(Duration::from_millis(500)),
            StoreError::InvalidData(_) => None,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// What to do when an incoming record's natural key already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Keep the stored value
    #[default]
    Preserve,
    /// Overwrite the stored value
    Refresh,
}

impl ConflictPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictPolicy::Preserve => "preserve",
            ConflictPolicy::Refresh => "refresh",
        }
    }
}

impl std::str::FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "preserve" | "keep" => Ok(ConflictPolicy::Preserve),
            "refresh" | "overwrite" => Ok(ConflictPolicy::Refresh),
            other => Err(format!("unknown conflict policy '{}'", other)),
        }
    }
}

/// Persistent metric store.
#[async_trait]
pub trait MetricStore: Send + Sync {
    /// Write one batch atomically. Returns the number of rows affected:
    /// inserted rows under `Preserve`, inserted or updated under `Refresh`.
    /// Records must not repeat a natural key within one batch.
    async fn upsert_batch(
        &self,
        records: &[CanonicalRecord],
        policy: ConflictPolicy,
    ) -> StoreResult<u64>;

    /// Append one run summary to the ledger.
    async fn record_run(&self, summary: &RunSummary) -> StoreResult<()>;

    /// Most recent stored observation time for `source`.
    async fn latest_timestamp(&self, source: &str) -> StoreResult<Option<DateTime<Utc>>>;
}
