//! DefiLlama data provider
//!
//! Protocol and chain history from the public llama.fi endpoints. Entities
//! are slugs scoped by endpoint, e.g. `{ id = "aave", scope = "fees" }`.
//! Every public endpoint returns full history in one response, so those
//! scopes are planned as a single window. The pro `inflows` endpoint answers
//! one day per call and needs an API key.
//!
//! DefiLlama reports zero for days before a protocol launched; zero values
//! are dropped for every metric from this source.

mod client;
mod normalizer;

pub use client::{DefiLlamaAdapter, LlamaScope};
pub use normalizer::{parse_flows, parse_series};
