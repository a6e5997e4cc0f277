use chrono::Duration as ChronoDuration;
use std::str::FromStr;
use std::time::Duration;

use super::normalizer::parse_market_chart;
use crate::backfill::ChunkStrategy;
use crate::provider::{
    FetchRequest, ParseOutput, ProviderError, ProviderResult, RateProfile, SourceAdapter,
};
use crate::schema::FetchTask;

pub const MAX_DAYS_PER_CHUNK: i64 = 365;

const PRO_BASE_URL: &str = "https://pro-api.coingecko.com/api/v3";
const DEMO_BASE_URL: &str = "https://api.coingecko.com/api/v3";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoinGeckoPlan {
    Pro,
    Demo,
}

impl CoinGeckoPlan {
    pub fn base_url(&self) -> &'static str {
        match self {
            CoinGeckoPlan::Pro => PRO_BASE_URL,
            CoinGeckoPlan::Demo => DEMO_BASE_URL,
        }
    }

    pub fn default_profile(&self) -> RateProfile {
        let profile = match self {
            CoinGeckoPlan::Pro => RateProfile::new(8.0, 4),
            CoinGeckoPlan::Demo => RateProfile::new(0.5, 1),
        };
        profile
            .with_max_attempts(3)
            .with_timeout(Duration::from_secs(60))
            .with_retry_delay(Duration::from_secs(5))
    }
}

impl FromStr for CoinGeckoPlan {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pro" => Ok(CoinGeckoPlan::Pro),
            "demo" | "free" => Ok(CoinGeckoPlan::Demo),
            other => Err(ProviderError::Configuration(format!(
                "unknown CoinGecko plan '{}'",
                other
            ))),
        }
    }
}

pub struct CoinGeckoAdapter {
    api_key: String,
    plan: CoinGeckoPlan,
    base_url: String,
    profile: RateProfile,
}

impl CoinGeckoAdapter {
    pub fn new(api_key: impl Into<String>, plan: CoinGeckoPlan) -> Self {
        Self {
            api_key: api_key.into(),
            plan,
            base_url: plan.base_url().to_string(),
            profile: plan.default_profile(),
        }
    }

    pub fn pro(api_key: impl Into<String>) -> Self {
        Self::new(api_key, CoinGeckoPlan::Pro)
    }

    pub fn demo(api_key: impl Into<String>) -> Self {
        Self::new(api_key, CoinGeckoPlan::Demo)
    }

    pub fn plan(&self) -> CoinGeckoPlan {
        self.plan
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_rate_profile(mut self, profile: RateProfile) -> Self {
        self.profile = profile;
        self
    }
}

impl SourceAdapter for CoinGeckoAdapter {
    fn name(&self) -> &str {
        "coingecko"
    }

    fn rate_profile(&self) -> RateProfile {
        self.profile.clone()
    }

    fn chunk_strategy(&self, _scope: Option<&str>) -> ChunkStrategy {
        ChunkStrategy::Fixed(ChronoDuration::days(MAX_DAYS_PER_CHUNK))
    }

    fn build_request(&self, task: &FetchTask) -> ProviderResult<FetchRequest> {
        let coin = task
            .entities
            .first()
            .ok_or_else(|| ProviderError::Internal("task without entities".into()))?;

        let request = FetchRequest::get(format!(
            "{}/coins/{}/market_chart/range",
            self.base_url, coin
        ))
        .with_query("vs_currency", "usd")
        .with_query("from", task.window.start().timestamp())
        .with_query("to", task.window.end().timestamp())
        .with_query("precision", "full");

        Ok(match self.plan {
            CoinGeckoPlan::Pro => request.with_header("x-cg-pro-api-key", &self.api_key),
            // keyless public access
            CoinGeckoPlan::Demo if self.api_key.is_empty() => request,
            CoinGeckoPlan::Demo => request.with_query("x_cg_demo_api_key", &self.api_key),
        })
    }

    fn parse_response(&self, task: &FetchTask, body: &str) -> ProviderResult<ParseOutput> {
        let coin = task
            .entities
            .first()
            .ok_or_else(|| ProviderError::Internal("task without entities".into()))?;
        parse_market_chart(body, coin, &task.window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntitySpec, TimeWindow};
    use chrono::{TimeZone, Utc};

    fn task() -> FetchTask {
        FetchTask {
            id: 0,
            entities: vec!["bitcoin".into()],
            scope: None,
            window: TimeWindow::new(
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 11, 0, 0, 0).unwrap(),
            )
            .unwrap(),
        }
    }

    #[test]
    fn test_pro_key_goes_in_header() {
        let req = CoinGeckoAdapter::pro("pk").build_request(&task()).unwrap();
        assert_eq!(
            req.url,
            "https://pro-api.coingecko.com/api/v3/coins/bitcoin/market_chart/range"
        );
        assert_eq!(req.query_value("from"), Some("1704067200"));
        assert_eq!(req.query_value("to"), Some("1704931200"));
        assert_eq!(req.query_value("precision"), Some("full"));
        assert!(req.headers.contains(&("x-cg-pro-api-key".into(), "pk".into())));
        assert_eq!(req.query_value("x_cg_demo_api_key"), None);
    }

    #[test]
    fn test_demo_key_goes_in_query() {
        let adapter = CoinGeckoAdapter::demo("dk");
        let req = adapter.build_request(&task()).unwrap();
        assert!(req.url.starts_with("https://api.coingecko.com/api/v3/"));
        assert_eq!(req.query_value("x_cg_demo_api_key"), Some("dk"));
        assert!(req.headers.is_empty());
        assert_eq!(adapter.rate_profile().requests_per_sec, 0.5);
        assert_eq!(adapter.rate_profile().concurrency, 1);
    }

    #[test]
    fn test_plan_parsing() {
        assert_eq!("PRO".parse::<CoinGeckoPlan>().unwrap(), CoinGeckoPlan::Pro);
        assert_eq!("demo".parse::<CoinGeckoPlan>().unwrap(), CoinGeckoPlan::Demo);
        assert!("enterprise".parse::<CoinGeckoPlan>().is_err());
    }

    #[test]
    fn test_three_year_range_plans_three_windows_per_coin() {
        let adapter = CoinGeckoAdapter::pro("pk");
        let start = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        let end = start + ChronoDuration::days(1095);
        let tasks = adapter
            .plan_chunks(start, end, &[EntitySpec::new("bitcoin"), EntitySpec::new("ethereum")])
            .unwrap();
        assert_eq!(tasks.len(), 6);
        assert!(tasks.iter().all(|t| t.window.span() <= ChronoDuration::days(365)));
    }
}
