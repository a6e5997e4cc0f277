//! Logging bootstrap shared by the collector binaries.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: standard tracing filter, wins over everything else
//! - `LOG_FORMAT`: `pretty` (default), `compact` or `json`
//! - `LOG_TIMESTAMPS`: `local` (default), `utc` or `none`
//! - `LOG_LEVEL`: fallback filter when `RUST_LOG` is unset

mod config;

pub use config::{init_logging, LogConfig, LogFormat, TimestampFormat};
