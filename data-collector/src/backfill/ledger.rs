//! Run summary and end-of-run report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::schema::FetchTask;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    NoData,
    Error,
}

impl RunStatus {
    /// `error` when there were tasks and all of them failed, `no_data` when
    /// nothing was fetched, `success` otherwise.
    pub fn derive(total_tasks: usize, failed_tasks: usize, records_fetched: usize) -> Self {
        if total_tasks > 0 && failed_tasks >= total_tasks {
            RunStatus::Error
        } else if records_fetched == 0 {
            RunStatus::NoData
        } else {
            RunStatus::Success
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::NoData => "no_data",
            RunStatus::Error => "error",
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            RunStatus::Success | RunStatus::NoData => 0,
            RunStatus::Error => 1,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable, append-only record of one engine invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub source_name: String,
    pub started_at: DateTime<Utc>,
    pub status: RunStatus,
    /// Rows written (inserted, or inserted/updated under Refresh)
    pub records_count: u64,
}

impl RunSummary {
    pub fn new(
        source_name: impl Into<String>,
        started_at: DateTime<Utc>,
        status: RunStatus,
        records_count: u64,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            source_name: source_name.into(),
            started_at,
            status,
            records_count,
        }
    }
}

/// Planned work shown instead of executing a dry run.
#[derive(Debug, Clone)]
pub struct DryRunPreview {
    pub task_count: usize,
    pub preview: Vec<FetchTask>,
}

impl DryRunPreview {
    pub fn new(tasks: &[FetchTask], preview_len: usize) -> Self {
        Self {
            task_count: tasks.len(),
            preview: tasks.iter().take(preview_len).cloned().collect(),
        }
    }
}

/// Everything the operator sees at the end of a run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub summary: RunSummary,
    pub tasks_total: usize,
    pub tasks_failed: usize,
    pub records_fetched: usize,
    /// Records left after deduplication
    pub records_unique: usize,
    pub records_written: u64,
    pub failed_batches: usize,
    /// Labels of tasks that ended in `FailedFinal`
    pub failed_entities: Vec<String>,
    pub elapsed: Duration,
    pub dry_run: Option<DryRunPreview>,
}

impl RunReport {
    pub fn status(&self) -> RunStatus {
        self.summary.status
    }

    pub fn exit_code(&self) -> i32 {
        self.summary.status.exit_code()
    }

    /// Fetched records per second over the whole run.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            0.0
        } else {
            self.records_fetched as f64 / secs
        }
    }
}
