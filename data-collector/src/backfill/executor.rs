//! Backfill executor
//!
//! Drives one source end to end: resolve the range, plan, fetch through the
//! worker pool, deduplicate, upsert and append the run to the ledger.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::dedup::deduplicate;
use super::fetcher::Fetcher;
use super::ledger::{DryRunPreview, RunReport, RunStatus, RunSummary};
use super::planner::PlanError;
use super::pool::WorkerPool;
use super::progress::RunProgress;
use super::rate_limiter::RateLimiter;
use super::transport::HttpTransport;
use super::upserter::Upserter;
use crate::config::EngineSettings;
use crate::provider::SourceAdapter;
use crate::schema::{CanonicalRecord, EntitySpec, FetchTask};
use crate::storage::{ConflictPolicy, MetricStore, StoreError};
use collector_common::error::{ConfigurationError, ErrorCategory, ErrorClassification};

#[derive(Error, Debug)]
pub enum BackfillError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ErrorClassification for BackfillError {
    fn category(&self) -> ErrorCategory {
        match self {
            BackfillError::Configuration(e) => e.category(),
            BackfillError::Plan(e) => e.category(),
            BackfillError::Store(e) => e.category(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    /// Historical fill; existing rows are left untouched
    #[default]
    Backfill,
    /// Recent data; existing rows are refreshed
    Live,
}

impl RunMode {
    pub fn default_policy(&self) -> ConflictPolicy {
        match self {
            RunMode::Backfill => ConflictPolicy::Preserve,
            RunMode::Live => ConflictPolicy::Refresh,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Backfill => "backfill",
            RunMode::Live => "live",
        }
    }
}

/// Where a run starts and ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunRange {
    Between {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// From the newest stored observation minus `lookback` until now. With
    /// nothing stored yet the run covers just the look-back.
    CatchUp { lookback: ChronoDuration },
}

/// Parameters of one engine invocation.
#[derive(Debug, Clone)]
pub struct RunParams {
    pub range: RunRange,
    /// Case-insensitive entity ids to keep; empty keeps every entity
    pub entity_filter: Vec<String>,
    pub dry_run: bool,
    pub concurrency: Option<usize>,
    pub requests_per_sec: Option<f64>,
    pub mode: RunMode,
    /// Overrides the mode's default policy
    pub conflict_policy: Option<ConflictPolicy>,
}

impl RunParams {
    pub fn backfill(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            range: RunRange::Between { start, end },
            entity_filter: Vec::new(),
            dry_run: false,
            concurrency: None,
            requests_per_sec: None,
            mode: RunMode::Backfill,
            conflict_policy: None,
        }
    }

    pub fn live(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            mode: RunMode::Live,
            ..Self::backfill(start, end)
        }
    }

    pub fn catch_up(lookback: ChronoDuration) -> Self {
        Self {
            range: RunRange::CatchUp { lookback },
            mode: RunMode::Live,
            ..Self::backfill(Utc::now(), Utc::now())
        }
    }

    pub fn with_entities<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entity_filter = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    pub fn with_rate(mut self, requests_per_sec: f64) -> Self {
        self.requests_per_sec = Some(requests_per_sec);
        self
    }

    pub fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = Some(policy);
        self
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.conflict_policy.unwrap_or(self.mode.default_policy())
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        match self.range {
            RunRange::Between { start, end } if end < start => {
                return Err(ConfigurationError::invalid_value(
                    "range",
                    format!("end {} is before start {}", end, start),
                ));
            }
            RunRange::CatchUp { lookback } if lookback <= ChronoDuration::zero() => {
                return Err(ConfigurationError::invalid_value(
                    "catch_up",
                    "look-back must be positive",
                ));
            }
            _ => {}
        }
        if matches!(self.concurrency, Some(0)) {
            return Err(ConfigurationError::invalid_value(
                "concurrency",
                "must be at least 1",
            ));
        }
        if let Some(rate) = self.requests_per_sec {
            if !(rate.is_finite() && rate > 0.0) {
                return Err(ConfigurationError::invalid_value(
                    "requests_per_sec",
                    "must be a positive number",
                ));
            }
        }
        Ok(())
    }
}

pub struct BackfillExecutor {
    adapter: Arc<dyn SourceAdapter>,
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn MetricStore>,
    engine: EngineSettings,
    entities: Vec<EntitySpec>,
    /// Lowercased provider entity id -> canonical entity id
    entity_links: HashMap<String, i32>,
}

impl BackfillExecutor {
    pub fn new(
        adapter: Arc<dyn SourceAdapter>,
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn MetricStore>,
        engine: EngineSettings,
    ) -> Self {
        Self {
            adapter,
            transport,
            store,
            engine,
            entities: Vec::new(),
            entity_links: HashMap::new(),
        }
    }

    pub fn with_entities(mut self, entities: Vec<EntitySpec>) -> Self {
        self.entities = entities;
        self
    }

    pub fn with_entity_links(mut self, links: HashMap<String, i32>) -> Self {
        self.entity_links = links
            .into_iter()
            .map(|(id, linked)| (id.to_lowercase(), linked))
            .collect();
        self
    }

    pub fn source_name(&self) -> &str {
        self.adapter.name()
    }

    /// Execute one run. Errors raised before any task runs are appended to
    /// the ledger as an `error` run with zero records.
    pub async fn run(&self, params: RunParams) -> Result<RunReport, BackfillError> {
        let started_at = Utc::now();
        match self.execute(&params, started_at).await {
            Ok(report) => Ok(report),
            Err(err) => {
                error!(source = self.source_name(), "Run aborted: {}", err);
                if !params.dry_run {
                    self.record_aborted_run(started_at).await;
                }
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        params: &RunParams,
        started_at: DateTime<Utc>,
    ) -> Result<RunReport, BackfillError> {
        let clock = Instant::now();
        let source = self.source_name().to_string();
        params.validate()?;

        let (start, end) = self.resolve_range(params.range).await?;
        let entities = self.select_entities(&params.entity_filter)?;
        self.adapter.validate_entities(&entities)?;
        let tasks = self.adapter.plan_chunks(start, end, &entities)?;

        info!(
            source = %source,
            mode = params.mode.as_str(),
            entities = entities.len(),
            tasks = tasks.len(),
            "Planned {} to {}",
            start.format("%Y-%m-%d %H:%M"),
            end.format("%Y-%m-%d %H:%M")
        );

        if params.dry_run {
            return Ok(self.preview(source, started_at, &tasks, clock));
        }

        let profile = self.adapter.rate_profile().apply_overrides(
            params.requests_per_sec,
            params.concurrency,
            None,
            None,
        );
        let mut limiter = RateLimiter::new(profile.requests_per_sec)?;
        if let Some(quota) = profile.quota {
            limiter = limiter.with_quota(quota)?;
        }
        let fetcher = Arc::new(Fetcher::new(
            self.adapter.clone(),
            self.transport.clone(),
            Arc::new(limiter),
        ));
        let progress = Arc::new(RunProgress::new(
            source.clone(),
            tasks.len(),
            self.engine.progress_every,
        ));

        let tasks_total = tasks.len();
        let output = WorkerPool::new(profile.concurrency)
            .run(tasks, fetcher, progress)
            .await;

        let failed: Vec<_> = output
            .outcomes
            .iter()
            .filter(|o| !o.is_success())
            .collect();
        let failed_entities = failed.iter().map(|o| o.task.label()).collect();
        let records_fetched = output.records.len();

        let mut unique = deduplicate(output.records);
        if unique.duplicates > 0 {
            info!(source = %source, duplicates = unique.duplicates, "Dropped duplicate observations");
        }
        self.link_entities(&mut unique.records);

        let upserted = Upserter::new(self.store.clone(), self.engine.batch_size)
            .upsert(&unique.records, params.policy())
            .await;

        let status = RunStatus::derive(tasks_total, failed.len(), records_fetched);
        let summary = RunSummary::new(source.clone(), started_at, status, upserted.written);
        if let Err(e) = self.store.record_run(&summary).await {
            warn!(source = %source, "Failed to append run to ledger: {}", e);
        }

        let report = RunReport {
            summary,
            tasks_total,
            tasks_failed: failed.len(),
            records_fetched,
            records_unique: unique.records.len(),
            records_written: upserted.written,
            failed_batches: upserted.failed_batches,
            failed_entities,
            elapsed: clock.elapsed(),
            dry_run: None,
        };
        info!(
            source = %source,
            status = %report.status(),
            fetched = report.records_fetched,
            written = report.records_written,
            failed_tasks = report.tasks_failed,
            "Run finished in {:.1}s",
            report.elapsed.as_secs_f64()
        );
        Ok(report)
    }

    async fn resolve_range(
        &self,
        range: RunRange,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>), BackfillError> {
        match range {
            RunRange::Between { start, end } => Ok((start, end)),
            RunRange::CatchUp { lookback } => {
                let end = Utc::now();
                let back_from = |at: DateTime<Utc>| {
                    at.checked_sub_signed(lookback).ok_or_else(|| {
                        ConfigurationError::invalid_value(
                            "catch_up",
                            format!("look-back of {} days is out of range", lookback.num_days()),
                        )
                    })
                };
                let start = match self.store.latest_timestamp(self.source_name()).await? {
                    Some(latest) => back_from(latest)?.min(back_from(end)?),
                    None => back_from(end)?,
                };
                info!(source = self.source_name(), "Catching up from {}", start);
                Ok((start, end))
            }
        }
    }

    fn select_entities(&self, filter: &[String]) -> Result<Vec<EntitySpec>, ConfigurationError> {
        if self.entities.is_empty() {
            return Err(ConfigurationError::MissingField(format!(
                "providers.{}.entities",
                self.source_name()
            )));
        }
        if filter.is_empty() {
            return Ok(self.entities.clone());
        }

        let selected: Vec<EntitySpec> = self
            .entities
            .iter()
            .filter(|e| filter.iter().any(|f| f.eq_ignore_ascii_case(&e.id)))
            .cloned()
            .collect();
        if selected.is_empty() {
            return Err(ConfigurationError::Invalid(format!(
                "no {} entities match {}",
                self.source_name(),
                filter.join(",")
            )));
        }
        Ok(selected)
    }

    fn link_entities(&self, records: &mut [CanonicalRecord]) {
        if self.entity_links.is_empty() {
            return;
        }
        for record in records.iter_mut() {
            if let Some(linked) = self.entity_links.get(&record.asset_id.to_lowercase()) {
                record.entity_id = Some(*linked);
            }
        }
    }

    fn preview(
        &self,
        source: String,
        started_at: DateTime<Utc>,
        tasks: &[FetchTask],
        clock: Instant,
    ) -> RunReport {
        let preview = DryRunPreview::new(tasks, self.engine.preview_tasks);
        info!(source = %source, tasks = tasks.len(), "Dry run; nothing fetched or written");
        RunReport {
            summary: RunSummary::new(source, started_at, RunStatus::Success, 0),
            tasks_total: tasks.len(),
            tasks_failed: 0,
            records_fetched: 0,
            records_unique: 0,
            records_written: 0,
            failed_batches: 0,
            failed_entities: Vec::new(),
            elapsed: clock.elapsed(),
            dry_run: Some(preview),
        }
    }

    async fn record_aborted_run(&self, started_at: DateTime<Utc>) {
        let summary = RunSummary::new(self.source_name(), started_at, RunStatus::Error, 0);
        if let Err(e) = self.store.record_run(&summary).await {
            warn!(source = self.source_name(), "Failed to append aborted run to ledger: {}", e);
        }
    }
}
