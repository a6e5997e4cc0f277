use serde_json::Value;
use std::time::Duration;

use super::normalizer::parse_daily_adjusted;
use crate::backfill::ChunkStrategy;
use crate::provider::{
    FetchRequest, HttpResponse, ParseOutput, ProviderError, ProviderResult, RateProfile,
    ResponseClass, SourceAdapter, WindowQuota,
};
use crate::schema::FetchTask;

pub const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co/query";
pub const FREE_TIER_DAILY_CALLS: u32 = 25;

pub struct AlphaVantageAdapter {
    api_key: String,
    base_url: String,
    profile: RateProfile,
}

impl AlphaVantageAdapter {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            profile: Self::default_profile(),
        }
    }

    pub fn default_profile() -> RateProfile {
        RateProfile::new(0.4, 1)
            .with_max_attempts(3)
            .with_timeout(Duration::from_secs(60))
            .with_base_backoff(8.0)
            .with_retry_delay(Duration::from_secs(5))
            .with_quota(WindowQuota::per_day(FREE_TIER_DAILY_CALLS))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_rate_profile(mut self, profile: RateProfile) -> Self {
        self.profile = profile;
        self
    }
}

impl SourceAdapter for AlphaVantageAdapter {
    fn name(&self) -> &str {
        "alphavantage"
    }

    fn rate_profile(&self) -> RateProfile {
        self.profile.clone()
    }

    fn chunk_strategy(&self, _scope: Option<&str>) -> ChunkStrategy {
        ChunkStrategy::Single
    }

    fn build_request(&self, task: &FetchTask) -> ProviderResult<FetchRequest> {
        let ticker = task
            .entities
            .first()
            .ok_or_else(|| ProviderError::Internal("task without entities".into()))?;

        Ok(FetchRequest::get(&self.base_url)
            .with_query("function", "TIME_SERIES_DAILY_ADJUSTED")
            .with_query("symbol", ticker.to_uppercase())
            .with_query("outputsize", "full")
            .with_query("apikey", &self.api_key))
    }

    fn classify_response(&self, response: &HttpResponse) -> ResponseClass {
        let class = ResponseClass::from_status(response.status);
        if class != ResponseClass::Success {
            return class;
        }
        match serde_json::from_str::<Value>(&response.body) {
            Ok(json) if json.get("Note").is_some() || json.get("Information").is_some() => {
                ResponseClass::RateLimited
            }
            Ok(json) if json.get("Error Message").is_some() => ResponseClass::PermanentError,
            _ => ResponseClass::Success,
        }
    }

    fn parse_response(&self, task: &FetchTask, body: &str) -> ProviderResult<ParseOutput> {
        let ticker = task
            .entities
            .first()
            .ok_or_else(|| ProviderError::Internal("task without entities".into()))?;
        parse_daily_adjusted(body, ticker, &task.window)
    }
}
