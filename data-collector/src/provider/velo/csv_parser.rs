//! Velo rows CSV parser
//!
//! The first line names the columns; `time` (epoch ms), `exchange` and
//! `coin` identify a row and every other known column is a metric. Minute
//! rows are folded into hourly records, the last row of the hour winning.

use std::collections::HashMap;

use crate::provider::parse::{coerce_str, from_epoch};
use crate::provider::{ParseOutput, ProviderError, ProviderResult};
use crate::schema::{CanonicalRecord, Granularity, NaturalKey, TimeWindow};

const METRIC_MAP: &[(&str, &str)] = &[
    ("open_price", "OPEN_PRICE"),
    ("high_price", "HIGH_PRICE"),
    ("low_price", "LOW_PRICE"),
    ("close_price", "CLOSE_PRICE"),
    ("coin_volume", "COIN_VOLUME"),
    ("dollar_volume", "DOLLAR_VOLUME"),
    ("buy_coin_volume", "BUY_COIN_VOLUME"),
    ("sell_coin_volume", "SELL_COIN_VOLUME"),
    ("buy_dollar_volume", "BUY_DOLLAR_VOLUME"),
    ("sell_dollar_volume", "SELL_DOLLAR_VOLUME"),
    ("buy_trades", "BUY_TRADES"),
    ("sell_trades", "SELL_TRADES"),
    ("total_trades", "TOTAL_TRADES"),
    ("coin_open_interest_high", "COIN_OI_HIGH"),
    ("coin_open_interest_low", "COIN_OI_LOW"),
    ("coin_open_interest_close", "COIN_OI_CLOSE"),
    ("dollar_open_interest_high", "DOLLAR_OI_HIGH"),
    ("dollar_open_interest_low", "DOLLAR_OI_LOW"),
    ("dollar_open_interest_close", "DOLLAR_OI_CLOSE"),
    ("funding_rate", "FUNDING_RATE"),
    ("funding_rate_avg", "FUNDING_RATE_AVG"),
    ("premium", "PREMIUM"),
    ("buy_liquidations", "BUY_LIQUIDATIONS"),
    ("sell_liquidations", "SELL_LIQUIDATIONS"),
    ("buy_liquidations_coin_volume", "BUY_LIQ_COIN_VOL"),
    ("sell_liquidations_coin_volume", "SELL_LIQ_COIN_VOL"),
    ("buy_liquidations_dollar_volume", "BUY_LIQ_DOLLAR_VOL"),
    ("sell_liquidations_dollar_volume", "SELL_LIQ_DOLLAR_VOL"),
    ("liquidations_coin_volume", "LIQ_COIN_VOL"),
    ("liquidations_dollar_volume", "LIQ_DOLLAR_VOL"),
];

/// Stored metric name for a Velo column.
pub fn metric_for_column(column: &str) -> Option<&'static str> {
    METRIC_MAP
        .iter()
        .find(|(col, _)| *col == column)
        .map(|(_, metric)| *metric)
}

pub fn parse_rows(body: &str, window: &TimeWindow) -> ProviderResult<ParseOutput> {
    let mut lines = body.lines().map(str::trim).filter(|l| !l.is_empty());
    let Some(header) = lines.next() else {
        return Ok(ParseOutput::default());
    };
    let headers: Vec<&str> = header.split(',').map(str::trim).collect();

    let position = |name: &str| headers.iter().position(|h| *h == name);
    let (Some(time_col), Some(exchange_col), Some(coin_col)) =
        (position("time"), position("exchange"), position("coin"))
    else {
        return Err(ProviderError::Parse(format!(
            "CSV header lacks time/exchange/coin: {}",
            header
        )));
    };
    let metric_cols: Vec<(usize, &'static str)> = headers
        .iter()
        .enumerate()
        .filter_map(|(i, h)| metric_for_column(h).map(|m| (i, m)))
        .collect();

    let mut out = ParseOutput::default();
    let mut slots: HashMap<NaturalKey, usize> = HashMap::new();

    for line in lines {
        let values: Vec<&str> = line.split(',').collect();
        if values.len() != headers.len() {
            out.skip();
            continue;
        }
        let Some(ts) = values[time_col].trim().parse::<i64>().ok().and_then(from_epoch) else {
            out.skip();
            continue;
        };
        if !window.contains(ts) {
            continue;
        }
        let coin = values[coin_col].trim();
        let exchange = values[exchange_col].trim();

        for (col, metric) in &metric_cols {
            // empty fields are absent, not zero
            let Some(value) = coerce_str(values[*col], &[]) else {
                continue;
            };
            let record = CanonicalRecord::new("velo", coin, *metric, value, ts, Granularity::Hourly)
                .with_exchange(exchange)
                .with_domain("derivative");
            match slots.get(&record.natural_key()) {
                Some(&slot) => out.records[slot] = record,
                None => {
                    slots.insert(record.natural_key(), out.records.len());
                    out.push(record);
                }
            }
        }
    }
    Ok(out)
}
