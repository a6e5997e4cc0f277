//! Artemis data provider
//!
//! Daily fundamentals from `https://api.artemisxyz.com/data/{metric}/`.
//! Entities are Artemis symbols scoped by metric, e.g.
//! `{ id = "eth", scope = "PRICE" }`; up to 50 symbols sharing a metric are
//! requested together over windows of at most 365 days.

mod client;
mod normalizer;

pub use client::{ArtemisAdapter, DEFAULT_BASE_URL, MAX_DAYS_PER_CHUNK, MAX_SYMBOLS_PER_REQUEST};
pub use normalizer::{parse_symbols, SENTINELS};
