//! Source adapter trait definitions
//!
//! A source adapter describes one external data API: how to plan its work,
//! how to turn a task into an HTTP request, how to classify the answer and
//! how to parse a body into canonical records. Adapters hold no concurrency
//! or retry logic; the backfill engine drives them.

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

use crate::backfill::{plan_tasks, ChunkStrategy, PlanError};
use crate::schema::{CanonicalRecord, EntitySpec, FetchTask, Granularity, ZeroPolicy};
use collector_common::error::{
    ConfigurationError, ErrorCategory, ErrorClassification, NetworkError,
};

/// Provider error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProviderError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Rate limited by provider")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Provider unavailable (HTTP {status}): {message}")]
    Unavailable { status: u16, message: String },

    #[error("Request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ErrorClassification for ProviderError {
    fn category(&self) -> ErrorCategory {
        match self {
            ProviderError::Configuration(_) => ErrorCategory::Configuration,
            ProviderError::Authentication(_) => ErrorCategory::Permanent,
            ProviderError::RateLimited { .. } => ErrorCategory::ResourceExhausted,
            ProviderError::Unavailable { .. } => ErrorCategory::Transient,
            ProviderError::Rejected { .. } => ErrorCategory::Permanent,
            ProviderError::Parse(_) => ErrorCategory::Permanent,
            ProviderError::Network(err) => err.category(),
            ProviderError::Internal(_) => ErrorCategory::Internal,
        }
    }

    fn suggested_retry_delay(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited { retry_after } => {
                Some(retry_after.unwrap_or(Duration::from_secs(1)))
            }
            ProviderError::Unavailable { .. } => Some(Duration::from_secs(1)),
            ProviderError::Network(err) => err.suggested_retry_delay(),
            _ => None,
        }
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Fixed-size request quota over a calendar-like window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaPeriod {
    Minute,
    Day,
}

/// "N requests per minute/day", enforced alongside the steady rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowQuota {
    pub requests: u32,
    pub period: QuotaPeriod,
}

impl WindowQuota {
    pub fn per_minute(requests: u32) -> Self {
        Self {
            requests,
            period: QuotaPeriod::Minute,
        }
    }

    pub fn per_day(requests: u32) -> Self {
        Self {
            requests,
            period: QuotaPeriod::Day,
        }
    }
}

/// Throughput and retry profile of one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct RateProfile {
    /// Aggregate request rate shared by all workers
    pub requests_per_sec: f64,
    /// Worker pool size
    pub concurrency: usize,
    /// Attempts per task, first attempt included
    pub max_attempts: u32,
    /// Per-call HTTP timeout
    pub timeout: Duration,
    /// Base of the exponential wait after a rate-limited response
    pub base_backoff: f64,
    /// Linear step of the wait after a transient failure
    pub retry_delay: Duration,
    pub quota: Option<WindowQuota>,
}

impl Default for RateProfile {
    fn default() -> Self {
        Self {
            requests_per_sec: 1.0,
            concurrency: 1,
            max_attempts: 3,
            timeout: Duration::from_secs(60),
            base_backoff: 2.0,
            retry_delay: Duration::from_secs(1),
            quota: None,
        }
    }
}

impl RateProfile {
    pub fn new(requests_per_sec: f64, concurrency: usize) -> Self {
        Self {
            requests_per_sec,
            concurrency,
            ..Default::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_base_backoff(mut self, base: f64) -> Self {
        self.base_backoff = base;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_quota(mut self, quota: WindowQuota) -> Self {
        self.quota = Some(quota);
        self
    }

    /// Apply optional operator overrides on top of the provider defaults.
    pub fn apply_overrides(
        mut self,
        requests_per_sec: Option<f64>,
        concurrency: Option<usize>,
        max_attempts: Option<u32>,
        timeout: Option<Duration>,
    ) -> Self {
        if let Some(rate) = requests_per_sec {
            self.requests_per_sec = rate;
        }
        if let Some(n) = concurrency {
            self.concurrency = n;
        }
        if let Some(n) = max_attempts {
            self.max_attempts = n;
        }
        if let Some(t) = timeout {
            self.timeout = t;
        }
        self
    }
}

/// HTTP basic credentials. Header and query-parameter keys travel in
/// `FetchRequest::headers` / `FetchRequest::query`.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// A fully-built outgoing GET request.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub basic_auth: Option<BasicAuth>,
    pub timeout: Duration,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            basic_auth: None,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.basic_auth = Some(BasicAuth {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Status line and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    /// Parsed `Retry-After` header, if the provider sent one
    pub retry_after: Option<Duration>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            retry_after: None,
        }
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}

/// How the fetcher should treat a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    Success,
    RateLimited,
    /// No data for this request; an empty result, not a failure
    NotFound,
    TransientError,
    PermanentError,
}

impl ResponseClass {
    /// Status-code classification shared by every provider.
    pub fn from_status(status: u16) -> Self {
        match status {
            200..=299 => ResponseClass::Success,
            429 => ResponseClass::RateLimited,
            404 => ResponseClass::NotFound,
            408 | 500..=599 => ResponseClass::TransientError,
            _ => ResponseClass::PermanentError,
        }
    }
}

/// Records parsed from one body plus the number of fields skipped.
#[derive(Debug, Clone, Default)]
pub struct ParseOutput {
    pub records: Vec<CanonicalRecord>,
    /// Fields that were absent, non-numeric or sentinel placeholders
    pub skipped: usize,
}

impl ParseOutput {
    pub fn push(&mut self, record: CanonicalRecord) {
        self.records.push(record);
    }

    pub fn skip(&mut self) {
        self.skipped += 1;
    }
}

/// One external data provider.
pub trait SourceAdapter: Send + Sync {
    /// Source name written to every record and the run ledger
    fn name(&self) -> &str;

    fn rate_profile(&self) -> RateProfile;

    fn granularity(&self) -> Granularity {
        Granularity::Daily
    }

    /// Entities combined into one request
    fn max_entities_per_request(&self) -> usize {
        1
    }

    /// Reject entity selections this adapter can never serve, before any
    /// task is planned or fetched.
    fn validate_entities(&self, _entities: &[EntitySpec]) -> Result<(), ConfigurationError> {
        Ok(())
    }

    /// Chunking used for entities requested under `scope`.
    fn chunk_strategy(&self, scope: Option<&str>) -> ChunkStrategy;

    /// Split `[start, end)` and the entity list into tasks.
    fn plan_chunks(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        entities: &[EntitySpec],
    ) -> Result<Vec<FetchTask>, PlanError> {
        plan_tasks(start, end, entities, self.max_entities_per_request(), |scope| {
            self.chunk_strategy(scope)
        })
    }

    fn build_request(&self, task: &FetchTask) -> ProviderResult<FetchRequest>;

    fn classify_response(&self, response: &HttpResponse) -> ResponseClass {
        ResponseClass::from_status(response.status)
    }

    fn parse_response(&self, task: &FetchTask, body: &str) -> ProviderResult<ParseOutput>;

    fn zero_policy(&self, _metric_name: &str) -> ZeroPolicy {
        ZeroPolicy::Keep
    }
}
