//! DefiLlama response normalization

use serde_json::Value;

use super::client::LlamaScope;
use crate::provider::parse::{coerce_value, parse_json, parse_timestamp};
use crate::provider::{ParseOutput, ProviderError, ProviderResult};
use crate::schema::{CanonicalRecord, Granularity, TimeWindow};

/// One point of a history series: `[ts, value]` or an object with `date`
/// and a scope-specific value field.
fn point(entry: &Value, scope: LlamaScope) -> (Option<Value>, Option<f64>) {
    match entry {
        Value::Array(pair) if pair.len() >= 2 => {
            (Some(pair[0].clone()), coerce_value(&pair[1], &[]))
        }
        Value::Object(obj) => {
            let value = match scope {
                LlamaScope::Stablecoin => obj
                    .get("totalCirculating")
                    .and_then(|t| t.get("peggedUSD")),
                _ => obj.get("totalLiquidityUSD").or_else(|| obj.get("tvl")),
            };
            (
                obj.get("date").cloned(),
                value.and_then(|v| coerce_value(v, &[])),
            )
        }
        _ => (None, None),
    }
}

/// Parse a full-history body and keep the points inside `window`.
pub fn parse_series(
    body: &str,
    scope: LlamaScope,
    slug: &str,
    window: &TimeWindow,
) -> ProviderResult<ParseOutput> {
    let json = parse_json(body)?;
    let series = match scope {
        LlamaScope::ChainTvl | LlamaScope::Stablecoin => json.as_array(),
        LlamaScope::Tvl => json.get("tvl").and_then(Value::as_array),
        _ => json.get("totalDataChart").and_then(Value::as_array),
    };
    let Some(series) = series else {
        if json.is_object() || json.is_array() {
            // protocol without this kind of data
            return Ok(ParseOutput::default());
        }
        return Err(ProviderError::Parse(format!(
            "unexpected {} body for {}",
            scope, slug
        )));
    };

    let mut out = ParseOutput::default();
    for entry in series {
        let (ts, value) = point(entry, scope);
        match (ts.as_ref().and_then(parse_timestamp), value) {
            (Some(ts), Some(value)) if window.contains(ts) => out.push(CanonicalRecord::new(
                "defillama",
                slug,
                scope.metric(),
                value,
                ts,
                Granularity::Daily,
            )),
            (Some(_), Some(_)) => {}
            _ => out.skip(),
        }
    }
    Ok(out)
}

/// Parse a one-day `{"inflows": x, "outflows": y}` body, stamped with the
/// window start.
pub fn parse_flows(body: &str, slug: &str, window: &TimeWindow) -> ProviderResult<ParseOutput> {
    let json = parse_json(body)?;
    let mut out = ParseOutput::default();
    for (field, metric) in [("inflows", "INFLOW"), ("outflows", "OUTFLOW")] {
        match json.get(field).and_then(|v| coerce_value(v, &[])) {
            Some(value) => out.push(CanonicalRecord::new(
                "defillama",
                slug,
                metric,
                value,
                window.start(),
                Granularity::Daily,
            )),
            None => out.skip(),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn window() -> TimeWindow {
        TimeWindow::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 4, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_total_data_chart() {
        let body = r#"{"name": "Aave", "totalDataChart": [
            [1703980800, 100.0], [1704067200, 0], [1704153600, 250.5], [1704240000, null]
        ]}"#;
        let out = parse_series(body, LlamaScope::Fees, "aave", &window()).unwrap();
        // zero survives parsing; the fetcher applies the drop policy
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[1].value, 250.5);
        assert_eq!(out.records[1].metric_name, "FEES");
        assert_eq!(out.skipped, 1);
    }

    #[test]
    fn test_protocol_tvl_objects() {
        let body = r#"{"tvl": [
            {"date": 1704067200, "totalLiquidityUSD": 1.5e9},
            {"date": 1704153600, "totalLiquidityUSD": 1.6e9}
        ]}"#;
        let out = parse_series(body, LlamaScope::Tvl, "aave", &window()).unwrap();
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[0].metric_name, "TVL");
    }

    #[test]
    fn test_chain_tvl_and_stablecoin_arrays() {
        let chain = r#"[{"date": 1704067200, "tvl": 3.2e10}]"#;
        let out = parse_series(chain, LlamaScope::ChainTvl, "ethereum", &window()).unwrap();
        assert_eq!(out.records[0].metric_name, "CHAIN_TVL");

        let stable = r#"[{"date": "1704153600", "totalCirculating": {"peggedUSD": 9.1e10}}]"#;
        let out = parse_series(stable, LlamaScope::Stablecoin, "1", &window()).unwrap();
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].value, 9.1e10);
    }

    #[test]
    fn test_missing_series_is_empty() {
        let out = parse_series(r#"{"statusCode": 404}"#, LlamaScope::Dexs, "x", &window()).unwrap();
        assert!(out.records.is_empty());
        assert!(parse_series("42", LlamaScope::Dexs, "x", &window()).is_err());
    }

    #[test]
    fn test_flows() {
        let out = parse_flows(r#"{"inflows": 1200.0, "outflows": null}"#, "aave", &window()).unwrap();
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].metric_name, "INFLOW");
        assert_eq!(out.records[0].timestamp, window().start());
        assert_eq!(out.skipped, 1);
    }
}
