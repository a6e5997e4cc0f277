//! Canonical metric observations and their natural key.

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Resolution a record is stored at. Timestamps are truncated to the
/// bucket before the natural key is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hourly,
    Daily,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Hourly => "hourly",
            Granularity::Daily => "daily",
        }
    }

    fn step(&self) -> TimeDelta {
        match self {
            Granularity::Hourly => TimeDelta::hours(1),
            Granularity::Daily => TimeDelta::days(1),
        }
    }

    /// Truncate `ts` to the start of its bucket.
    pub fn bucket(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        // duration_trunc only fails for out-of-range timestamps, which
        // cannot be produced from a DateTime<Utc> at hour/day steps
        ts.duration_trunc(self.step()).unwrap_or(ts)
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a zero value is a legitimate observation for a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZeroPolicy {
    /// Zero is a real reading (funding rates, dividends, premiums)
    #[default]
    Keep,
    /// Zero is a provider placeholder for "no data yet"
    Drop,
}

impl ZeroPolicy {
    pub fn admits(&self, value: f64) -> bool {
        match self {
            ZeroPolicy::Keep => true,
            ZeroPolicy::Drop => value != 0.0,
        }
    }
}

/// Uniqueness key of a stored metric row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NaturalKey {
    pub source: String,
    pub asset_id: String,
    pub metric_name: String,
    pub bucket: DateTime<Utc>,
    /// Empty when the record has no exchange
    pub exchange: String,
}

/// One observation after provider-specific parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub source: String,
    pub asset_id: String,
    pub metric_name: String,
    pub value: f64,
    /// Already truncated to `granularity`
    pub timestamp: DateTime<Utc>,
    pub exchange: Option<String>,
    pub granularity: Granularity,
    pub domain: Option<String>,
    /// Canonical entity link, when one is configured
    pub entity_id: Option<i32>,
}

impl CanonicalRecord {
    pub fn new(
        source: impl Into<String>,
        asset_id: impl Into<String>,
        metric_name: impl Into<String>,
        value: f64,
        timestamp: DateTime<Utc>,
        granularity: Granularity,
    ) -> Self {
        Self {
            source: source.into(),
            asset_id: asset_id.into(),
            metric_name: metric_name.into(),
            value,
            timestamp: granularity.bucket(timestamp),
            exchange: None,
            granularity,
            domain: None,
            entity_id: None,
        }
    }

    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = Some(exchange.into());
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_entity_id(mut self, entity_id: i32) -> Self {
        self.entity_id = Some(entity_id);
        self
    }

    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            source: self.source.clone(),
            asset_id: self.asset_id.clone(),
            metric_name: self.metric_name.clone(),
            bucket: self.granularity.bucket(self.timestamp),
            exchange: self.exchange.clone().unwrap_or_default(),
        }
    }
}
