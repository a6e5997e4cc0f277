//! CoinGecko data provider
//!
//! Daily price, market cap and volume history from
//! `/coins/{id}/market_chart/range`, one coin per request in windows of at
//! most 365 days. A pro key goes in the `x-cg-pro-api-key` header; a demo
//! key travels as the `x_cg_demo_api_key` query parameter against the public
//! host at a much lower rate.

mod client;
mod normalizer;

pub use client::{CoinGeckoAdapter, CoinGeckoPlan, MAX_DAYS_PER_CHUNK};
pub use normalizer::{parse_market_chart, METRIC_MAP};
