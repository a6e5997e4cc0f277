//! Backfill CLI commands
//!
//! - `run` - backfill one source
//! - `run-all` - backfill every enabled source in a fixed order

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use clap::{Args, Subcommand};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::backfill::{BackfillExecutor, ReqwestTransport, RunParams, RunReport};
use crate::config::Settings;
use crate::provider::{build_adapter, SourceKind};
use crate::storage::{ConflictPolicy, InMemoryStore, MetricStore, MetricsRepository};
use collector_common::error::ConfigurationError;

/// Three years, the default history depth.
const DEFAULT_DAYS: i64 = 1095;

/// Backfill subcommands
#[derive(Subcommand)]
pub enum BackfillCommands {
    /// Backfill a single source
    Run(RunArgs),
    /// Backfill every enabled source
    RunAll(RangeArgs),
}

/// Range and execution options shared by both commands
#[derive(Args, Debug, Clone)]
pub struct RangeArgs {
    /// Start date (YYYY-MM-DD, inclusive)
    #[arg(long)]
    pub start: Option<String>,

    /// End date (YYYY-MM-DD, exclusive; default: today)
    #[arg(long)]
    pub end: Option<String>,

    /// Days before `end` to start from when `--start` is not given
    #[arg(long, default_value_t = DEFAULT_DAYS)]
    pub days: i64,

    /// Preview the planned tasks without fetching or writing
    #[arg(long)]
    pub dry_run: bool,

    /// Worker count override
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Requests per second override
    #[arg(long)]
    pub rate: Option<f64>,

    /// Live mode: refresh existing rows by default
    #[arg(long)]
    pub live: bool,

    /// Conflict policy override (preserve or refresh)
    #[arg(long)]
    pub policy: Option<ConflictPolicy>,

    /// Live catch-up: from the newest stored row minus N days until now
    #[arg(long, conflicts_with_all = ["start", "end"])]
    pub catch_up_days: Option<i64>,
}

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Source to backfill (artemis, coingecko, defillama, velo, alphavantage)
    #[arg(long, short)]
    pub source: String,

    /// Only these entities (comma-separated, case-insensitive)
    #[arg(long, value_delimiter = ',')]
    pub entities: Vec<String>,

    #[command(flatten)]
    pub range: RangeArgs,
}

/// Execute backfill commands and return the process exit code
pub async fn execute(cmd: BackfillCommands) -> Result<i32> {
    let settings = Settings::load().context("failed to load settings")?;
    settings.validate()?;

    match cmd {
        BackfillCommands::Run(args) => {
            let kind: SourceKind = args.source.parse()?;
            let params = run_params(&args.range)?.with_entities(args.entities);
            let store = open_store(&settings, &params).await?;
            let report = run_source(kind, &settings, store, params).await?;
            print_report(&report);
            Ok(report.exit_code())
        }
        BackfillCommands::RunAll(range) => execute_run_all(&settings, &range).await,
    }
}

async fn execute_run_all(settings: &Settings, range: &RangeArgs) -> Result<i32> {
    let params = run_params(range)?;
    let store = open_store(settings, &params).await?;

    let mut results: Vec<(SourceKind, Option<RunReport>)> = Vec::new();
    for kind in SourceKind::RUN_ORDER {
        let enabled = settings
            .providers
            .get(kind.as_str())
            .map(|p| p.enabled)
            .unwrap_or(false);
        if !enabled {
            info!(source = %kind, "Source disabled; skipping");
            continue;
        }

        match run_source(kind, settings, store.clone(), params.clone()).await {
            Ok(report) => {
                print_report(&report);
                results.push((kind, Some(report)));
            }
            Err(e) => {
                error!(source = %kind, "Source failed: {:#}", e);
                results.push((kind, None));
            }
        }
    }

    println!();
    println!("=== Run All Summary ===");
    println!();
    let mut failed = 0;
    for (kind, report) in &results {
        match report {
            Some(r) if r.exit_code() == 0 => println!(
                "   {:<14} {:<8} {} written",
                kind.as_str(),
                r.status().as_str(),
                r.records_written
            ),
            Some(r) => {
                failed += 1;
                println!("   {:<14} {:<8} {} tasks failed", kind.as_str(), r.status().as_str(), r.tasks_failed);
            }
            None => {
                failed += 1;
                println!("   {:<14} aborted", kind.as_str());
            }
        }
    }
    println!();
    println!("{}/{} sources succeeded", results.len() - failed, results.len());

    Ok(if failed == 0 { 0 } else { 1 })
}

async fn run_source(
    kind: SourceKind,
    settings: &Settings,
    store: Arc<dyn MetricStore>,
    params: RunParams,
) -> Result<RunReport> {
    let provider = settings
        .providers
        .get(kind.as_str())
        .with_context(|| format!("no settings block for {}", kind))?;
    let adapter = build_adapter(kind, provider)?;
    let transport = Arc::new(ReqwestTransport::new(adapter.rate_profile().concurrency)?);

    let executor = BackfillExecutor::new(adapter, transport, store, settings.engine.clone())
        .with_entities(provider.entities.clone())
        .with_entity_links(provider.entity_links.clone());
    Ok(executor.run(params).await?)
}

/// A dry run without catch-up never touches the database.
async fn open_store(settings: &Settings, params: &RunParams) -> Result<Arc<dyn MetricStore>> {
    let needs_database =
        !params.dry_run || matches!(params.range, crate::backfill::RunRange::CatchUp { .. });
    if !needs_database {
        return Ok(Arc::new(InMemoryStore::new()));
    }
    let repository = MetricsRepository::from_settings(&settings.database).await?;
    Ok(Arc::new(repository))
}

fn run_params(args: &RangeArgs) -> Result<RunParams> {
    let mut params = match args.catch_up_days {
        Some(days) => RunParams::catch_up(day_span("catch-up-days", days)?),
        None => {
            let end = match &args.end {
                Some(end) => parse_date(end)?,
                None => midnight(Utc::now().date_naive()),
            };
            let start = match &args.start {
                Some(start) => parse_date(start)?,
                None => end
                    .checked_sub_signed(day_span("days", args.days)?)
                    .ok_or_else(|| {
                        ConfigurationError::invalid_value(
                            "days",
                            format!("{} days before {} is out of range", args.days, end.date_naive()),
                        )
                    })?,
            };
            if args.live {
                RunParams::live(start, end)
            } else {
                RunParams::backfill(start, end)
            }
        }
    };

    if args.dry_run {
        params = params.dry_run();
    }
    if let Some(n) = args.concurrency {
        params = params.with_concurrency(n);
    }
    if let Some(rate) = args.rate {
        params = params.with_rate(rate);
    }
    if let Some(policy) = args.policy {
        params = params.with_policy(policy);
    }
    params.validate()?;
    Ok(params)
}

fn day_span(field: &str, days: i64) -> Result<Duration, ConfigurationError> {
    Duration::try_days(days)
        .ok_or_else(|| ConfigurationError::invalid_value(field, format!("{} days is out of range", days)))
}

fn parse_date(raw: &str) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{}', expected YYYY-MM-DD", raw))?;
    Ok(midnight(date))
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

fn print_report(report: &RunReport) {
    let summary = &report.summary;
    println!();

    if let Some(preview) = &report.dry_run {
        println!("=== Dry Run: {} ===", summary.source_name);
        println!();
        println!("Tasks planned:    {}", preview.task_count);
        if !preview.preview.is_empty() {
            println!("First {} tasks:", preview.preview.len());
            for task in &preview.preview {
                println!("   - {}", task.label());
            }
        }
        println!();
        return;
    }

    println!("=== Backfill Report: {} ===", summary.source_name);
    println!();
    println!("Run ID:           {}", summary.run_id);
    println!("Status:           {}", summary.status);
    println!("Tasks:            {} ({} failed)", report.tasks_total, report.tasks_failed);
    println!("Records fetched:  {}", report.records_fetched);
    println!("Unique records:   {}", report.records_unique);
    println!("Records written:  {}", report.records_written);
    if report.failed_batches > 0 {
        println!("Failed batches:   {}", report.failed_batches);
    }
    println!("Elapsed:          {:.1}s", report.elapsed.as_secs_f64());
    println!("Throughput:       {:.1} records/s", report.throughput());
    if !report.failed_entities.is_empty() {
        println!();
        println!("Failed tasks:");
        for label in &report.failed_entities {
            println!("   - {}", label);
        }
        warn!(
            source = %summary.source_name,
            failed = report.failed_entities.len(),
            "Some tasks failed; rerun to fill the gaps"
        );
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backfill::{RunMode, RunRange};

    fn range() -> RangeArgs {
        RangeArgs {
            start: None,
            end: None,
            days: DEFAULT_DAYS,
            dry_run: false,
            concurrency: None,
            rate: None,
            live: false,
            policy: None,
            catch_up_days: None,
        }
    }

    #[test]
    fn test_explicit_dates() {
        let args = RangeArgs {
            start: Some("2024-01-01".into()),
            end: Some("2024-04-01".into()),
            ..range()
        };
        let params = run_params(&args).unwrap();
        assert_eq!(
            params.range,
            RunRange::Between {
                start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                end: Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap(),
            }
        );
        assert_eq!(params.mode, RunMode::Backfill);
        assert_eq!(params.policy(), ConflictPolicy::Preserve);
    }

    #[test]
    fn test_days_back_from_end() {
        let args = RangeArgs {
            end: Some("2024-01-31".into()),
            days: 30,
            live: true,
            ..range()
        };
        let params = run_params(&args).unwrap();
        match params.range {
            RunRange::Between { start, end } => assert_eq!(end - start, Duration::days(30)),
            other => panic!("unexpected range {:?}", other),
        }
        assert_eq!(params.policy(), ConflictPolicy::Refresh);
    }

    #[test]
    fn test_catch_up_and_overrides() {
        let args = RangeArgs {
            catch_up_days: Some(3),
            policy: Some(ConflictPolicy::Preserve),
            rate: Some(0.5),
            ..range()
        };
        let params = run_params(&args).unwrap();
        assert_eq!(params.range, RunRange::CatchUp { lookback: Duration::days(3) });
        assert_eq!(params.mode, RunMode::Live);
        assert_eq!(params.policy(), ConflictPolicy::Preserve);
        assert_eq!(params.requests_per_sec, Some(0.5));
    }

    #[test]
    fn test_rejects_bad_input() {
        let inverted = RangeArgs {
            start: Some("2024-02-01".into()),
            end: Some("2024-01-01".into()),
            ..range()
        };
        assert!(run_params(&inverted).is_err());

        let malformed = RangeArgs {
            start: Some("01/02/2024".into()),
            ..range()
        };
        assert!(run_params(&malformed).is_err());
    }

    #[test]
    fn test_out_of_range_day_counts_are_errors() {
        let too_far_back = RangeArgs {
            days: i64::MAX,
            ..range()
        };
        assert!(run_params(&too_far_back).is_err());

        let past_calendar = RangeArgs {
            end: Some("2024-01-01".into()),
            days: 1_000_000_000,
            ..range()
        };
        assert!(run_params(&past_calendar).is_err());

        let catch_up = RangeArgs {
            catch_up_days: Some(i64::MIN),
            ..range()
        };
        assert!(run_params(&catch_up).is_err());
    }
}
