//! CoinGecko market chart normalization

use serde_json::Value;

use crate::provider::parse::{coerce_value, from_epoch, parse_json};
use crate::provider::{ParseOutput, ProviderError, ProviderResult};
use crate::schema::{CanonicalRecord, Granularity, TimeWindow};

/// Response series and the metric each one becomes.
pub const METRIC_MAP: &[(&str, &str)] = &[
    ("prices", "PRICE"),
    ("market_caps", "MARKET_CAP"),
    ("total_volumes", "VOLUME_24H"),
];

/// Parse `{"prices": [[ms, v], ...], "market_caps": ..., "total_volumes": ...}`.
pub fn parse_market_chart(
    body: &str,
    coin: &str,
    window: &TimeWindow,
) -> ProviderResult<ParseOutput> {
    let json = parse_json(body)?;
    if !json.is_object() {
        return Err(ProviderError::Parse("expected a market chart object".into()));
    }

    let mut out = ParseOutput::default();
    for (field, metric) in METRIC_MAP {
        let Some(series) = json.get(*field).and_then(Value::as_array) else {
            continue;
        };
        for point in series {
            let ts = point.get(0).and_then(Value::as_i64).and_then(from_epoch);
            let value = point.get(1).and_then(|v| coerce_value(v, &[]));
            match (ts, value) {
                (Some(ts), Some(value)) if window.contains(ts) => out.push(CanonicalRecord::new(
                    "coingecko",
                    coin,
                    *metric,
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

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_maps_all_three_series_within_window() {
        let window = TimeWindow::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap(),
        )
        .unwrap();
        let body = r#"{
            "prices": [[1704067200000, 42000.5], [1704153600000, 43000.0], [1704240000000, 44000.0]],
            "market_caps": [[1704067200000, 8.2e11], [1704153600000, null]],
            "total_volumes": [[1704110400000, 2.5e10]]
        }"#;
        let out = parse_market_chart(body, "bitcoin", &window).unwrap();

        let metrics: Vec<&str> = out.records.iter().map(|r| r.metric_name.as_str()).collect();
        assert_eq!(metrics, vec!["PRICE", "PRICE", "MARKET_CAP", "VOLUME_24H"]);
        assert_eq!(out.skipped, 1);
        // intraday point is bucketed to its day
        assert_eq!(
            out.records[3].timestamp,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
        assert!(out.records.iter().all(|r| r.asset_id == "bitcoin"));
    }

    #[test]
    fn test_error_object_yields_nothing() {
        let window = TimeWindow::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap(),
        )
        .unwrap();
        let out = parse_market_chart(r#"{"error": "coin not found"}"#, "nope", &window).unwrap();
        assert!(out.records.is_empty());
        assert!(parse_market_chart("[]", "nope", &window).is_err());
    }
}
