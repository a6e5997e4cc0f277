//! Artemis response normalization
//!
//! Bodies look like `{"data": {"symbols": {"<asset>": {"<metric>": ...}}}}`
//! where the metric series is either a list of `{date, val}` objects or a
//! `date -> value` map. Placeholder strings stand in for missing values.

use serde_json::Value;

use crate::provider::parse::{coerce_value, parse_json, parse_timestamp, parse_timestamp_str};
use crate::provider::{ParseOutput, ProviderError, ProviderResult};
use crate::schema::{CanonicalRecord, Granularity, TimeWindow};

pub const SENTINELS: &[&str] = &[
    "Metric not found.",
    "Metric not available for asset.",
    "Market data not available for asset.",
    "Latest data not available for this asset.",
];

/// Records for `metric` across every symbol in the body, clipped to `window`.
pub fn parse_symbols(body: &str, metric: &str, window: &TimeWindow) -> ProviderResult<ParseOutput> {
    let json = parse_json(body)?;
    let section = json.get("data").unwrap_or(&json);
    let symbols = section
        .get("symbols")
        .unwrap_or(section)
        .as_object()
        .ok_or_else(|| ProviderError::Parse("expected an object of symbols".into()))?;

    let key = metric.to_lowercase();
    let mut out = ParseOutput::default();

    for (asset, asset_data) in symbols {
        let series = asset_data.get(&key).or_else(|| asset_data.get(metric));
        let points: Vec<(Option<_>, Option<f64>)> = match series {
            Some(Value::Array(entries)) => entries
                .iter()
                .map(|entry| {
                    let ts = entry
                        .get("date")
                        .or_else(|| entry.get("timestamp"))
                        .and_then(parse_timestamp);
                    let value = entry
                        .get("val")
                        .or_else(|| entry.get("value"))
                        .and_then(|v| coerce_value(v, SENTINELS));
                    (ts, value)
                })
                .collect(),
            Some(Value::Object(map)) => map
                .iter()
                .map(|(date, v)| {
                    let ts = date.get(..10).and_then(parse_timestamp_str);
                    (ts, coerce_value(v, SENTINELS))
                })
                .collect(),
            // asset-level placeholder such as "Metric not available for asset."
            _ => {
                out.skip();
                continue;
            }
        };

        for point in points {
            match point {
                (Some(ts), Some(value)) if window.contains(ts) => out.push(CanonicalRecord::new(
                    "artemis",
                    asset,
                    metric,
                    value,
                    ts,
                    Granularity::Daily,
                )),
                (Some(_), Some(_)) => {}
                _ => out.skip(),
            }
        }
    }
    Ok(out)
}
