use chrono::Duration as ChronoDuration;
use std::time::Duration;

use super::csv_parser::parse_rows;
use crate::backfill::{ChunkStrategy, ValueBudget};
use crate::provider::{
    FetchRequest, ParseOutput, ProviderError, ProviderResult, RateProfile, SourceAdapter,
};
use crate::schema::{FetchTask, Granularity};

pub const DEFAULT_BASE_URL: &str = "https://api.velo.xyz/api/v1";

/// Values one response may carry across all rows and columns.
pub const VALUES_PER_CALL: u64 = 22_500;

/// Columns requested per row.
pub const FUTURES_COLUMNS: &[&str] = &[
    "close_price",
    "dollar_volume",
    "dollar_open_interest_close",
    "funding_rate",
    "premium",
];

/// The API returns minute rows even at `resolution=1h`.
const ROWS_PER_HOUR: u64 = 60;

pub struct VeloAdapter {
    api_key: String,
    base_url: String,
    profile: RateProfile,
}

impl VeloAdapter {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            profile: Self::default_profile(),
        }
    }

    pub fn default_profile() -> RateProfile {
        RateProfile::new(2.0, 1)
            .with_max_attempts(3)
            .with_timeout(Duration::from_secs(120))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_rate_profile(mut self, profile: RateProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn budget() -> ValueBudget {
        ValueBudget {
            max_values_per_call: VALUES_PER_CALL,
            columns: FUTURES_COLUMNS.len() as u64,
            intervals_per_unit: ROWS_PER_HOUR,
            unit: ChronoDuration::hours(1),
        }
    }
}

impl SourceAdapter for VeloAdapter {
    fn name(&self) -> &str {
        "velo"
    }

    fn rate_profile(&self) -> RateProfile {
        self.profile.clone()
    }

    fn granularity(&self) -> Granularity {
        Granularity::Hourly
    }

    fn chunk_strategy(&self, _scope: Option<&str>) -> ChunkStrategy {
        ChunkStrategy::ValueBudget(Self::budget())
    }

    fn build_request(&self, task: &FetchTask) -> ProviderResult<FetchRequest> {
        let exchange = task.scope.as_deref().ok_or_else(|| {
            ProviderError::Configuration(format!(
                "velo coins need an exchange scope: {}",
                task.entities.join(",")
            ))
        })?;

        Ok(FetchRequest::get(format!("{}/rows", self.base_url))
            .with_query("type", "futures")
            .with_query("exchanges", exchange)
            .with_query("coins", task.entities.join(","))
            .with_query("columns", FUTURES_COLUMNS.join(","))
            .with_query("begin", task.window.start_millis())
            .with_query("end", task.window.end_millis())
            .with_query("resolution", "1h")
            .with_basic_auth("api", &self.api_key))
    }

    fn parse_response(&self, task: &FetchTask, body: &str) -> ProviderResult<ParseOutput> {
        parse_rows(body, &task.window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntitySpec, TimeWindow};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_budget_allows_seventy_four_hours() {
        assert_eq!(VeloAdapter::budget().units_per_call(1), 74);
        assert_eq!(VeloAdapter::budget().span(1), ChronoDuration::hours(74));
    }

    #[test]
    fn test_request_shape() {
        let window = TimeWindow::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        )
        .unwrap();
        let task = FetchTask {
            id: 0,
            entities: vec!["BTC".into()],
            scope: Some("bybit".into()),
            window,
        };
        let req = VeloAdapter::new("secret").build_request(&task).unwrap();
        assert_eq!(req.url, "https://api.velo.xyz/api/v1/rows");
        assert_eq!(req.query_value("exchanges"), Some("bybit"));
        assert_eq!(req.query_value("coins"), Some("BTC"));
        assert_eq!(req.query_value("begin"), Some("1704067200000"));
        assert_eq!(req.query_value("end"), Some("1704153600000"));
        assert_eq!(
            req.query_value("columns"),
            Some("close_price,dollar_volume,dollar_open_interest_close,funding_rate,premium")
        );
        let auth = req.basic_auth.unwrap();
        assert_eq!(auth.username, "api");
        assert_eq!(auth.password, "secret");
    }

    #[test]
    fn test_one_week_plans_three_windows_per_pair() {
        let adapter = VeloAdapter::new("k");
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let entities = vec![
            EntitySpec::scoped("BTC", "bybit"),
            EntitySpec::scoped("ETH", "bybit"),
            EntitySpec::scoped("BTC", "okex-swap"),
        ];
        let tasks = adapter
            .plan_chunks(start, start + ChronoDuration::days(7), &entities)
            .unwrap();
        // 168h / 74h -> 74, 74, 20
        assert_eq!(tasks.len(), 9);
        assert!(tasks.iter().all(|t| t.entities.len() == 1));
        assert_eq!(tasks[2].window.span(), ChronoDuration::hours(20));
    }
}
