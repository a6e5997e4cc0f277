//! # Data Collector
//!
//! Historical and incremental backfill of time-series metrics from external
//! data providers into a single normalized store.
//!
//! ## Architecture
//!
//! - **Planner**: splits a date range and entity set into fetch tasks sized
//!   to each provider's request limits
//! - **Worker pool**: runs tasks concurrently behind a shared rate limiter
//!   with classified retries
//! - **Adapters**: one per provider, owning request construction and
//!   response normalization
//! - **Storage**: idempotent batched upserts keyed on the natural key, plus
//!   an append-only run ledger

pub mod backfill;
pub mod cli;
pub mod config;
pub mod provider;
pub mod schema;
pub mod storage;

// Re-export commonly used types
pub use backfill::{BackfillError, BackfillExecutor, RunMode, RunParams, RunReport, RunStatus};
pub use config::Settings;
pub use provider::{build_adapter, ProviderError, SourceAdapter, SourceKind};
pub use schema::{CanonicalRecord, Granularity, TimeWindow};
pub use storage::{ConflictPolicy, InMemoryStore, MetricStore, MetricsRepository};
