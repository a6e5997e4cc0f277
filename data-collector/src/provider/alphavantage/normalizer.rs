//! Alpha Vantage daily series normalization

use serde_json::Value;

use crate::provider::parse::{coerce_value, parse_json, parse_timestamp_str};
use crate::provider::{ParseOutput, ProviderError, ProviderResult};
use crate::schema::{CanonicalRecord, Granularity, TimeWindow};

const SERIES_KEY: &str = "Time Series (Daily)";

/// Daily bar field and the metric it is stored as.
pub const FIELD_MAP: &[(&str, &str)] = &[
    ("1. open", "OPEN"),
    ("2. high", "HIGH"),
    ("3. low", "LOW"),
    ("4. close", "CLOSE"),
    ("5. adjusted close", "ADJUSTED_CLOSE"),
    ("6. volume", "VOLUME"),
    ("7. dividend amount", "DIVIDEND_AMOUNT"),
    ("8. split coefficient", "SPLIT_COEFFICIENT"),
];

/// Records for every bar inside `window`. Assets are stored lowercase.
pub fn parse_daily_adjusted(
    body: &str,
    ticker: &str,
    window: &TimeWindow,
) -> ProviderResult<ParseOutput> {
    let json = parse_json(body)?;
    let series = json
        .get(SERIES_KEY)
        .and_then(Value::as_object)
        .ok_or_else(|| ProviderError::Parse(format!("missing '{}' for {}", SERIES_KEY, ticker)))?;

    let asset = ticker.to_lowercase();
    let mut out = ParseOutput::default();

    for (date, bar) in series {
        let Some(ts) = parse_timestamp_str(date) else {
            out.skip();
            continue;
        };
        if !window.contains(ts) {
            continue;
        }
        for (field, metric) in FIELD_MAP {
            match bar.get(*field).and_then(|v| coerce_value(v, &[])) {
                Some(value) => out.push(CanonicalRecord::new(
                    "alphavantage",
                    &asset,
                    *metric,
                    value,
                    ts,
                    Granularity::Daily,
                )),
                None => out.skip(),
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const BODY: &str = r#"{
        "Meta Data": {"2. Symbol": "MSFT"},
        "Time Series (Daily)": {
            "2024-01-03": {
                "1. open": "370.00", "2. high": "373.26", "3. low": "368.51",
                "4. close": "370.60", "5. adjusted close": "367.91",
                "6. volume": "23624600", "7. dividend amount": "0.0000",
                "8. split coefficient": "1.0"
            },
            "2023-12-29": {
                "1. open": "376.00", "2. high": "377.16", "3. low": "373.48",
                "4. close": "376.04", "5. adjusted close": "373.31",
                "6. volume": "18730000", "7. dividend amount": "0.0000",
                "8. split coefficient": "1.0"
            }
        }
    }"#;

    #[test]
    fn test_bars_inside_window() {
        let window = TimeWindow::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
        )
        .unwrap();
        let out = parse_daily_adjusted(BODY, "MSFT", &window).unwrap();
        assert_eq!(out.records.len(), 8);
        assert!(out.records.iter().all(|r| r.asset_id == "msft"));

        let dividend = out
            .records
            .iter()
            .find(|r| r.metric_name == "DIVIDEND_AMOUNT")
            .unwrap();
        assert_eq!(dividend.value, 0.0);
        let volume = out.records.iter().find(|r| r.metric_name == "VOLUME").unwrap();
        assert_eq!(volume.value, 23_624_600.0);
    }

    #[test]
    fn test_missing_series_is_parse_error() {
        let window = TimeWindow::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
        )
        .unwrap();
        assert!(matches!(
            parse_daily_adjusted(r#"{"Meta Data": {}}"#, "MSFT", &window),
            Err(ProviderError::Parse(_))
        ));
    }
}
