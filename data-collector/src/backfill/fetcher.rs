//! Single-task execution with timeout, classification and retry.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use super::rate_limiter::RateLimiter;
use super::retry::{RetryPolicy, RetryReason};
use super::transport::HttpTransport;
use crate::provider::{ProviderError, ResponseClass, SourceAdapter};
use crate::schema::{CanonicalRecord, FetchTask, TaskOutcome, TaskState};
use collector_common::error::ErrorClassification;

/// Records and outcome of one task.
#[derive(Debug)]
pub struct FetchResult {
    pub outcome: TaskOutcome,
    pub records: Vec<CanonicalRecord>,
}

/// What one attempt produced.
enum Attempt {
    Done(Vec<CanonicalRecord>),
    Retry {
        reason: RetryReason,
        retry_after: Option<Duration>,
        error: ProviderError,
    },
    Fatal(ProviderError),
}

pub struct Fetcher {
    adapter: Arc<dyn SourceAdapter>,
    transport: Arc<dyn HttpTransport>,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    timeout: Duration,
}

impl Fetcher {
    pub fn new(
        adapter: Arc<dyn SourceAdapter>,
        transport: Arc<dyn HttpTransport>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        let profile = adapter.rate_profile();
        Self {
            policy: RetryPolicy::from_profile(&profile),
            timeout: profile.timeout,
            adapter,
            transport,
            limiter,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run one task to a terminal state. Every attempt passes through the
    /// shared limiter.
    pub async fn fetch(&self, task: FetchTask) -> FetchResult {
        let mut state = TaskState::Queued;
        let mut attempt = 0u32;
        let mut last_wait = Duration::ZERO;

        loop {
            attempt += 1;
            self.limiter.acquire().await;
            advance(&mut state, TaskState::InFlight, &task);

            match self.attempt(&task).await {
                Attempt::Done(records) => {
                    advance(&mut state, TaskState::Succeeded, &task);
                    debug!(
                        task = task.id,
                        attempt,
                        records = records.len(),
                        "Task succeeded: {}",
                        task.label()
                    );
                    let outcome = TaskOutcome::succeeded(task, records.len(), attempt);
                    return FetchResult { outcome, records };
                }
                Attempt::Fatal(err) => {
                    advance(&mut state, TaskState::FailedFinal, &task);
                    error!(task = task.id, attempt, "Task failed: {}: {}", task.label(), err);
                    return self.failed(task, attempt, &err);
                }
                Attempt::Retry {
                    reason,
                    retry_after,
                    error,
                } => {
                    if !self.policy.allows_another(attempt) {
                        advance(&mut state, TaskState::FailedFinal, &task);
                        error!(
                            task = task.id,
                            attempt,
                            "Task failed after {} attempts: {}: {}",
                            attempt,
                            task.label(),
                            error
                        );
                        return self.failed(task, attempt, &error);
                    }

                    advance(&mut state, TaskState::RetryPending, &task);
                    let wait = self
                        .policy
                        .delay_for(reason, attempt, retry_after)
                        .max(last_wait);
                    last_wait = wait;
                    warn!(
                        task = task.id,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        "{}; retrying {} in {:?}",
                        error,
                        task.label(),
                        wait
                    );
                    tokio::time::sleep(wait).await;
                    advance(&mut state, TaskState::Queued, &task);
                }
            }
        }
    }

    async fn attempt(&self, task: &FetchTask) -> Attempt {
        let request = match self.adapter.build_request(task) {
            Ok(r) => r.with_timeout(self.timeout),
            Err(e) => return Attempt::Fatal(e),
        };

        let response = match self.transport.execute(&request).await {
            Ok(r) => r,
            Err(net) => {
                let err = ProviderError::from(net);
                return if err.is_transient() {
                    Attempt::Retry {
                        reason: RetryReason::Transient,
                        retry_after: None,
                        error: err,
                    }
                } else {
                    Attempt::Fatal(err)
                };
            }
        };

        match self.adapter.classify_response(&response) {
            ResponseClass::Success => match self.adapter.parse_response(task, &response.body) {
                Ok(parsed) => {
                    let mut dropped_zero = 0usize;
                    let records: Vec<CanonicalRecord> = parsed
                        .records
                        .into_iter()
                        .filter(|r| {
                            let keep = self.adapter.zero_policy(&r.metric_name).admits(r.value);
                            if !keep {
                                dropped_zero += 1;
                            }
                            keep
                        })
                        .collect();
                    if parsed.skipped > 0 || dropped_zero > 0 {
                        debug!(
                            task = task.id,
                            skipped = parsed.skipped,
                            dropped_zero,
                            "Skipped unusable values"
                        );
                    }
                    Attempt::Done(records)
                }
                Err(e) => Attempt::Fatal(e),
            },
            ResponseClass::NotFound => {
                debug!(task = task.id, status = response.status, "No data for {}", task.label());
                Attempt::Done(Vec::new())
            }
            ResponseClass::RateLimited => Attempt::Retry {
                reason: RetryReason::RateLimited,
                retry_after: response.retry_after,
                error: ProviderError::RateLimited {
                    retry_after: response.retry_after,
                },
            },
            ResponseClass::TransientError => Attempt::Retry {
                reason: RetryReason::Transient,
                retry_after: None,
                error: ProviderError::Unavailable {
                    status: response.status,
                    message: snippet(&response.body),
                },
            },
            ResponseClass::PermanentError => Attempt::Fatal(if matches!(response.status, 401 | 403) {
                ProviderError::Authentication(snippet(&response.body))
            } else {
                ProviderError::Rejected {
                    status: response.status,
                    message: snippet(&response.body),
                }
            }),
        }
    }

    fn failed(&self, task: FetchTask, attempts: u32, err: &ProviderError) -> FetchResult {
        FetchResult {
            outcome: TaskOutcome::failed(task, attempts, err.to_string()),
            records: Vec::new(),
        }
    }
}

fn advance(state: &mut TaskState, next: TaskState, task: &FetchTask) {
    debug_assert!(
        state.can_transition_to(next),
        "illegal task transition {:?} -> {:?}",
        state,
        next
    );
    tracing::trace!(task = task.id, from = ?*state, to = ?next, "Task state");
    *state = next;
}

fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(200) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock::{MockAdapter, ScriptedTransport};
    use crate::provider::{HttpResponse, RateProfile};
    use crate::schema::{TaskStatus, TimeWindow};
    use chrono::{TimeZone, Utc};
    use collector_common::error::NetworkError;

    fn task() -> FetchTask {
        FetchTask {
            id: 0,
            entities: vec!["BTC".into()],
            scope: None,
            window: TimeWindow::new(
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap(),
            )
            .unwrap(),
        }
    }

    fn fetcher(adapter: MockAdapter, transport: Arc<ScriptedTransport>) -> Fetcher {
        let limiter = Arc::new(RateLimiter::new(adapter.rate_profile().requests_per_sec).unwrap());
        Fetcher::new(Arc::new(adapter), transport, limiter)
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_three_times_then_success() {
        let adapter = MockAdapter::new("mock").with_profile(RateProfile::new(10.0, 1).with_max_attempts(5));
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(HttpResponse::new(429, "")),
            Ok(HttpResponse::new(429, "")),
            Ok(HttpResponse::new(429, "")),
            Ok(HttpResponse::ok(MockAdapter::body(&[("2024-01-01", 1.0), ("2024-01-02", 2.0)]))),
        ]));
        let result = fetcher(adapter, transport.clone()).fetch(task()).await;

        assert_eq!(result.outcome.status, TaskStatus::Succeeded);
        assert_eq!(result.outcome.attempts, 4);
        assert_eq!(result.records.len(), 2);
        assert_eq!(transport.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_stop_at_max_attempts() {
        let adapter = MockAdapter::new("mock").with_profile(RateProfile::new(10.0, 1).with_max_attempts(3));
        let transport = Arc::new(ScriptedTransport::repeating(HttpResponse::new(429, "")));
        let result = fetcher(adapter, transport.clone()).fetch(task()).await;

        assert_eq!(result.outcome.status, TaskStatus::Failed);
        assert_eq!(result.outcome.attempts, 3);
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_between_attempts_are_non_decreasing() {
        let adapter = MockAdapter::new("mock").with_profile(RateProfile::new(100.0, 1).with_max_attempts(5));
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(HttpResponse::new(429, "").with_retry_after(Duration::from_secs(20))),
            Ok(HttpResponse::new(429, "")),
            Ok(HttpResponse::new(503, "")),
            Ok(HttpResponse::new(429, "")),
            Ok(HttpResponse::new(429, "")),
        ]));
        let result = fetcher(adapter, transport.clone()).fetch(task()).await;
        assert_eq!(result.outcome.attempts, 5);

        let times = transport.call_times();
        let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(gaps.len(), 4);
        assert!(gaps.windows(2).all(|g| g[0] <= g[1]), "gaps: {:?}", gaps);
        assert!(gaps[0] >= Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_is_empty_success() {
        let adapter = MockAdapter::new("mock");
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(HttpResponse::new(404, ""))]));
        let result = fetcher(adapter, transport.clone()).fetch(task()).await;

        assert_eq!(result.outcome.status, TaskStatus::Succeeded);
        assert!(result.records.is_empty());
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_not_retried() {
        let adapter = MockAdapter::new("mock").with_profile(RateProfile::new(10.0, 1).with_max_attempts(5));
        let transport = Arc::new(ScriptedTransport::repeating(HttpResponse::new(401, "bad key")));
        let result = fetcher(adapter, transport.clone()).fetch(task()).await;

        assert_eq!(result.outcome.status, TaskStatus::Failed);
        assert_eq!(transport.calls(), 1);
        assert!(result.outcome.error.unwrap().contains("Authentication"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_errors_are_retried() {
        let adapter = MockAdapter::new("mock").with_profile(RateProfile::new(10.0, 1).with_max_attempts(3));
        let transport = Arc::new(ScriptedTransport::new(vec![
            Err(NetworkError::Timeout(Duration::from_secs(30))),
            Err(NetworkError::Connection("reset".into())),
            Ok(HttpResponse::ok(MockAdapter::body(&[("2024-01-01", 5.0)]))),
        ]));
        let result = fetcher(adapter, transport.clone()).fetch(task()).await;

        assert_eq!(result.outcome.status, TaskStatus::Succeeded);
        assert_eq!(result.outcome.attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unparseable_body_fails_without_retry() {
        let adapter = MockAdapter::new("mock").with_profile(RateProfile::new(10.0, 1).with_max_attempts(3));
        let transport = Arc::new(ScriptedTransport::repeating(HttpResponse::ok("<html>")));
        let result = fetcher(adapter, transport.clone()).fetch(task()).await;

        assert_eq!(result.outcome.status, TaskStatus::Failed);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_policy_applies_per_metric() {
        let adapter = MockAdapter::new("mock").with_zero_dropped_for("VALUE");
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(HttpResponse::ok(
            MockAdapter::body(&[("2024-01-01", 0.0), ("2024-01-02", 3.0)]),
        ))]));
        let result = fetcher(adapter, transport).fetch(task()).await;

        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].value, 3.0);
    }

    #[test]
    fn test_snippet_truncates_long_bodies() {
        let long = "x".repeat(500);
        assert_eq!(snippet(&long).len(), 203);
        assert_eq!(snippet(" short "), "short");
    }
}
