//! Source adapters
//!
//! This module defines the `SourceAdapter` seam and implements one adapter
//! per external API (Artemis, CoinGecko, DefiLlama, Velo, Alpha Vantage),
//! plus a scripted mock for tests.

pub mod alphavantage;
pub mod artemis;
pub mod coingecko;
pub mod defillama;
pub mod factory;
pub mod mock;
pub mod parse;
pub mod velo;
mod traits;

pub use factory::{build_adapter, SourceKind};
pub use traits::*;
