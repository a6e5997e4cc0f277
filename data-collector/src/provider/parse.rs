//! Value and timestamp coercion shared by the adapters.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use super::{ProviderError, ProviderResult};

/// Parse a JSON body, mapping failures to `ProviderError::Parse`.
pub fn parse_json(body: &str) -> ProviderResult<Value> {
    serde_json::from_str(body).map_err(|e| ProviderError::Parse(format!("invalid JSON: {}", e)))
}

/// Coerce a JSON field to a finite number.
///
/// Returns `None` for nulls, booleans, objects, strings that do not parse as
/// numbers and any string listed in `sentinels` (provider placeholder text).
pub fn coerce_value(value: &Value, sentinels: &[&str]) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => coerce_str(s, sentinels)?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Coerce delimited-text or JSON string content to a finite number.
pub fn coerce_str(raw: &str, sentinels: &[&str]) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || sentinels.iter().any(|s| s.eq_ignore_ascii_case(trimmed)) {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Interpret a JSON timestamp: `YYYY-MM-DD`, RFC 3339, or a unix epoch in
/// seconds or milliseconds.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp_str(s),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                from_epoch(i)
            } else {
                n.as_f64().and_then(|f| from_epoch(f as i64))
            }
        }
        _ => None,
    }
}

pub fn parse_timestamp_str(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| Utc.from_utc_datetime(&dt));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    s.parse::<i64>().ok().and_then(from_epoch)
}

/// Epoch values above 10^11 are milliseconds.
pub fn from_epoch(raw: i64) -> Option<DateTime<Utc>> {
    if raw.abs() >= 100_000_000_000 {
        DateTime::from_timestamp_millis(raw)
    } else {
        DateTime::from_timestamp(raw, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coerce_numbers_and_strings() {
        assert_eq!(coerce_value(&json!(1.5), &[]), Some(1.5));
        assert_eq!(coerce_value(&json!("2.25"), &[]), Some(2.25));
        assert_eq!(coerce_value(&json!(0), &[]), Some(0.0));
        assert_eq!(coerce_value(&json!(null), &[]), None);
        assert_eq!(coerce_value(&json!("abc"), &[]), None);
        assert_eq!(coerce_value(&json!({"a": 1}), &[]), None);
    }

    #[test]
    fn test_coerce_rejects_sentinels() {
        let sentinels = ["Metric not found."];
        assert_eq!(coerce_value(&json!("Metric not found."), &sentinels), None);
        assert_eq!(coerce_str("  ", &sentinels), None);
        assert_eq!(coerce_str("NaN", &sentinels), None);
    }

    #[test]
    fn test_parse_timestamps() {
        let day = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp(&json!("2024-02-01")), Some(day));
        assert_eq!(parse_timestamp(&json!(1706745600)), Some(day));
        assert_eq!(parse_timestamp(&json!(1706745600000i64)), Some(day));
        assert_eq!(parse_timestamp(&json!("2024-02-01T00:00:00Z")), Some(day));
        assert_eq!(parse_timestamp(&json!("1706745600")), Some(day));
        assert_eq!(parse_timestamp(&json!("yesterday")), None);
    }
}
