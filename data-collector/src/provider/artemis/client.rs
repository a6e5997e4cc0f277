use chrono::Duration as ChronoDuration;
use std::time::Duration;

use super::normalizer::parse_symbols;
use crate::backfill::ChunkStrategy;
use crate::provider::{
    FetchRequest, HttpResponse, ParseOutput, ProviderError, ProviderResult, RateProfile,
    ResponseClass, SourceAdapter,
};
use crate::schema::FetchTask;

pub const DEFAULT_BASE_URL: &str = "https://api.artemisxyz.com";
pub const MAX_SYMBOLS_PER_REQUEST: usize = 50;
pub const MAX_DAYS_PER_CHUNK: i64 = 365;

pub struct ArtemisAdapter {
    api_key: String,
    base_url: String,
    profile: RateProfile,
}

impl ArtemisAdapter {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            profile: Self::default_profile(),
        }
    }

    pub fn default_profile() -> RateProfile {
        RateProfile::new(6.6, 4)
            .with_max_attempts(3)
            .with_timeout(Duration::from_secs(120))
            .with_retry_delay(Duration::from_secs(2))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_rate_profile(mut self, profile: RateProfile) -> Self {
        self.profile = profile;
        self
    }

    fn metric<'a>(&self, task: &'a FetchTask) -> ProviderResult<&'a str> {
        task.scope.as_deref().ok_or_else(|| {
            ProviderError::Configuration(format!(
                "artemis entities need a metric scope: {}",
                task.entities.join(",")
            ))
        })
    }
}

impl SourceAdapter for ArtemisAdapter {
    fn name(&self) -> &str {
        "artemis"
    }

    fn rate_profile(&self) -> RateProfile {
        self.profile.clone()
    }

    fn max_entities_per_request(&self) -> usize {
        MAX_SYMBOLS_PER_REQUEST
    }

    fn chunk_strategy(&self, _scope: Option<&str>) -> ChunkStrategy {
        ChunkStrategy::Fixed(ChronoDuration::days(MAX_DAYS_PER_CHUNK))
    }

    fn build_request(&self, task: &FetchTask) -> ProviderResult<FetchRequest> {
        let metric = self.metric(task)?;
        // endDate is inclusive
        let start = task.window.start();
        let last_day = (task.window.end() - ChronoDuration::days(1)).max(start);

        Ok(
            FetchRequest::get(format!("{}/data/{}/", self.base_url, metric.to_lowercase()))
                .with_query("symbols", task.entities.join(","))
                .with_query("startDate", start.format("%Y-%m-%d"))
                .with_query("endDate", last_day.format("%Y-%m-%d"))
                .with_query("APIKey", &self.api_key),
        )
    }

    fn classify_response(&self, response: &HttpResponse) -> ResponseClass {
        match response.status {
            // unsupported symbol/metric combination
            400 => ResponseClass::NotFound,
            200 if response.body.trim().is_empty() => ResponseClass::NotFound,
            status => ResponseClass::from_status(status),
        }
    }

    fn parse_response(&self, task: &FetchTask, body: &str) -> ProviderResult<ParseOutput> {
        let metric = self.metric(task)?;
        parse_symbols(body, metric, &task.window)
    }
}
