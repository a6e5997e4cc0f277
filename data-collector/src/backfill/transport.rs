//! HTTP execution.
//!
//! Workers share one pooled client; connections are checked out per request
//! and returned when the body has been read.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::time::Duration;
use tracing::debug;

use crate::provider::{FetchRequest, HttpResponse};
use collector_common::error::NetworkError;

const USER_AGENT: &str = concat!("data-collector/", env!("CARGO_PKG_VERSION"));

/// Executes one request and returns whatever status came back. Only failures
/// that produced no status line are errors.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: &FetchRequest) -> Result<HttpResponse, NetworkError>;
}

/// reqwest-backed transport with a shared connection pool.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(pool_size: usize) -> Result<Self, NetworkError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .pool_max_idle_per_host(pool_size.max(1))
            .connect_timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| NetworkError::InvalidRequest(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: &FetchRequest) -> Result<HttpResponse, NetworkError> {
        let mut builder = self
            .client
            .get(&request.url)
            .query(&request.query)
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(auth) = &request.basic_auth {
            builder = builder.basic_auth(&auth.username, Some(&auth.password));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, request.timeout))?;

        let status = response.status().as_u16();
        let retry_after = parse_retry_after(response.headers());
        let body = response
            .text()
            .await
            .map_err(|e| map_reqwest_error(e, request.timeout))?;

        debug!(host = %host_of(&request.url), status, bytes = body.len(), "HTTP response");

        Ok(HttpResponse {
            status,
            body,
            retry_after,
        })
    }
}

/// Some providers carry the API key in the path or query, so neither logs nor
/// errors may include the full URL.
fn map_reqwest_error(err: reqwest::Error, timeout: Duration) -> NetworkError {
    let err = err.without_url();
    if err.is_timeout() {
        NetworkError::Timeout(timeout)
    } else if err.is_builder() {
        NetworkError::InvalidRequest(err.to_string())
    } else if err.is_connect() {
        NetworkError::Connection(err.to_string())
    } else {
        NetworkError::Request(err.to_string())
    }
}

fn host_of(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "<invalid url>".to_string())
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
