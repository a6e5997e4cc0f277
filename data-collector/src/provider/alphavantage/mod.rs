//! Alpha Vantage data provider
//!
//! Daily adjusted equity history via `TIME_SERIES_DAILY_ADJUSTED` with full
//! output, one ticker per request. The free tier allows a small number of
//! calls per day on top of the per-second pacing. Throttling is reported
//! inside a 200 response (`Note` / `Information`), not as HTTP 429.

mod client;
mod normalizer;

pub use client::{AlphaVantageAdapter, DEFAULT_BASE_URL, FREE_TIER_DAILY_CALLS};
pub use normalizer::{parse_daily_adjusted, FIELD_MAP};
