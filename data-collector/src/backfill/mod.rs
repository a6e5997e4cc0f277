//! Backfill engine
//!
//! Turns a source adapter, a time range and an entity list into stored
//! observations.
//!
//! ## Pipeline
//!
//! - **Planning**: split the range into provider-compliant tasks
//! - **Fetching**: a bounded worker pool drains the task queue; every
//!   request passes through one shared rate limiter and failed attempts are
//!   retried with backoff
//! - **Storage**: observations are deduplicated on their natural key and
//!   written in batches under an explicit conflict policy
//! - **Ledger**: every run appends a summary with its status and row count
//!
//! ## Usage
//!
//! ```ignore
//! use data_collector::backfill::{BackfillExecutor, RunParams};
//!
//! let executor = BackfillExecutor::new(adapter, transport, store, settings.engine)
//!     .with_entities(provider.entities.clone());
//! let report = executor.run(RunParams::backfill(start, end)).await?;
//! ```

mod dedup;
mod executor;
mod fetcher;
mod ledger;
mod planner;
mod pool;
mod progress;
mod rate_limiter;
mod retry;
mod transport;
mod upserter;

pub use dedup::{deduplicate, Deduplicated};
pub use executor::{BackfillError, BackfillExecutor, RunMode, RunParams, RunRange};
pub use fetcher::{FetchResult, Fetcher};
pub use ledger::{DryRunPreview, RunReport, RunStatus, RunSummary};
pub use planner::{plan_tasks, plan_windows, ChunkStrategy, PlanError, ValueBudget};
pub use pool::{PoolOutput, WorkerPool};
pub use progress::{ProgressSnapshot, RunProgress};
pub use rate_limiter::RateLimiter;
pub use retry::{RetryPolicy, RetryReason, MAX_BACKOFF};
pub use transport::{HttpTransport, ReqwestTransport};
pub use upserter::{UpsertReport, Upserter, MAX_BATCH_SIZE, MIN_BATCH_SIZE};
