//! Velo data provider
//!
//! Hourly futures metrics from the Velo `rows` endpoint, returned as CSV.
//! Entities are coins scoped by exchange, e.g.
//! `{ id = "BTC", scope = "binance-futures" }`. Velo caps the number of
//! values one response may carry, so windows are sized from that budget.
//! Authentication is HTTP basic with user `api` and the key as password.

mod client;
pub mod csv_parser;

pub use client::{VeloAdapter, DEFAULT_BASE_URL, FUTURES_COLUMNS, VALUES_PER_CALL};
pub use csv_parser::{parse_rows, metric_for_column};
