//! Mock adapter and scripted transport for tests and local development.
//!
//! `MockAdapter` speaks a tiny JSON dialect:
//! `{"data": [{"date": "2024-01-01", "value": 1.0}, ...]}` and emits one
//! `VALUE` record per row and entity, filtered to the task window.
//! `ScriptedTransport` replays canned responses and counts calls.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::time::Instant;

use crate::backfill::{ChunkStrategy, HttpTransport};
use crate::provider::parse::{coerce_value, parse_json, parse_timestamp};
use crate::provider::{
    FetchRequest, HttpResponse, ParseOutput, ProviderError, ProviderResult, RateProfile,
    SourceAdapter,
};
use crate::schema::{CanonicalRecord, FetchTask, Granularity, ZeroPolicy};
use collector_common::error::NetworkError;

pub const MOCK_METRIC: &str = "VALUE";

pub struct MockAdapter {
    name: String,
    profile: RateProfile,
    strategy: ChunkStrategy,
    max_entities: usize,
    granularity: Granularity,
    zero_dropped: HashSet<String>,
}

impl MockAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            profile: RateProfile::new(1000.0, 1),
            strategy: ChunkStrategy::Single,
            max_entities: 1,
            granularity: Granularity::Daily,
            zero_dropped: HashSet::new(),
        }
    }

    pub fn with_profile(mut self, profile: RateProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_strategy(mut self, strategy: ChunkStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_max_entities(mut self, n: usize) -> Self {
        self.max_entities = n;
        self
    }

    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    pub fn with_zero_dropped_for(mut self, metric: impl Into<String>) -> Self {
        self.zero_dropped.insert(metric.into());
        self
    }

    /// Render a response body in the mock dialect.
    pub fn body(rows: &[(&str, f64)]) -> String {
        let data: Vec<serde_json::Value> = rows
            .iter()
            .map(|(date, value)| serde_json::json!({ "date": date, "value": value }))
            .collect();
        serde_json::json!({ "data": data }).to_string()
    }
}

impl SourceAdapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn rate_profile(&self) -> RateProfile {
        self.profile.clone()
    }

    fn granularity(&self) -> Granularity {
        self.granularity
    }

    fn max_entities_per_request(&self) -> usize {
        self.max_entities
    }

    fn chunk_strategy(&self, _scope: Option<&str>) -> ChunkStrategy {
        self.strategy
    }

    fn build_request(&self, task: &FetchTask) -> ProviderResult<FetchRequest> {
        Ok(FetchRequest::get(format!("http://mock.invalid/{}", self.name))
            .with_query("entities", task.entities.join(","))
            .with_query("start", task.window.start_millis())
            .with_query("end", task.window.end_millis()))
    }

    fn parse_response(&self, task: &FetchTask, body: &str) -> ProviderResult<ParseOutput> {
        let json = parse_json(body)?;
        let rows = json
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| ProviderError::Parse("missing 'data' array".into()))?;

        let mut out = ParseOutput::default();
        for row in rows {
            let ts = row.get("date").and_then(parse_timestamp);
            let value = row.get("value").and_then(|v| coerce_value(v, &[]));
            match (ts, value) {
                (Some(ts), Some(value)) if task.window.contains(ts) => {
                    for entity in &task.entities {
                        out.push(CanonicalRecord::new(
                            &self.name,
                            entity,
                            MOCK_METRIC,
                            value,
                            ts,
                            self.granularity,
                        ));
                    }
                }
                (Some(_), Some(_)) => {}
                _ => out.skip(),
            }
        }
        Ok(out)
    }

    fn zero_policy(&self, metric_name: &str) -> ZeroPolicy {
        if self.zero_dropped.contains(metric_name) {
            ZeroPolicy::Drop
        } else {
            ZeroPolicy::Keep
        }
    }
}

type Responder = dyn Fn(&FetchRequest) -> Result<HttpResponse, NetworkError> + Send + Sync;

enum Script {
    Queue(VecDeque<Result<HttpResponse, NetworkError>>),
    Repeat(HttpResponse),
    Func(Arc<Responder>),
}

/// Transport that replays scripted responses.
pub struct ScriptedTransport {
    script: Mutex<Script>,
    requests: Mutex<Vec<(Instant, FetchRequest)>>,
}

impl ScriptedTransport {
    /// Responses are returned in order; once exhausted every call gets a 500.
    pub fn new(responses: Vec<Result<HttpResponse, NetworkError>>) -> Self {
        Self::with_script(Script::Queue(responses.into()))
    }

    /// Every call gets the same response.
    pub fn repeating(response: HttpResponse) -> Self {
        Self::with_script(Script::Repeat(response))
    }

    /// Responses are computed from the request.
    pub fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(&FetchRequest) -> Result<HttpResponse, NetworkError> + Send + Sync + 'static,
    {
        Self::with_script(Script::Func(Arc::new(responder)))
    }

    fn with_script(script: Script) -> Self {
        Self {
            script: Mutex::new(script),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.requests.lock().iter().map(|(t, _)| *t).collect()
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().iter().map(|(_, r)| r.clone()).collect()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(&self, request: &FetchRequest) -> Result<HttpResponse, NetworkError> {
        self.requests.lock().push((Instant::now(), request.clone()));
        let mut script = self.script.lock();
        match &mut *script {
            Script::Queue(queue) => queue
                .pop_front()
                .unwrap_or_else(|| Ok(HttpResponse::new(500, "script exhausted"))),
            Script::Repeat(response) => Ok(response.clone()),
            Script::Func(responder) => responder(request),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TimeWindow;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_mock_parse_filters_to_window() {
        let adapter = MockAdapter::new("mock");
        let task = FetchTask {
            id: 0,
            entities: vec!["a".into(), "b".into()],
            scope: None,
            window: TimeWindow::new(
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap(),
            )
            .unwrap(),
        };
        let body = MockAdapter::body(&[("2024-01-01", 1.0), ("2024-01-02", 2.0), ("2024-01-03", 3.0)]);
        let out = adapter.parse_response(&task, &body).unwrap();
        assert_eq!(out.records.len(), 4);
        assert_eq!(out.skipped, 0);
    }

    #[tokio::test]
    async fn test_scripted_transport_replays_in_order() {
        let transport = ScriptedTransport::new(vec![
            Ok(HttpResponse::new(429, "")),
            Ok(HttpResponse::ok("{}")),
        ]);
        let req = FetchRequest::get("http://mock.invalid");
        assert_eq!(transport.execute(&req).await.unwrap().status, 429);
        assert_eq!(transport.execute(&req).await.unwrap().status, 200);
        assert_eq!(transport.execute(&req).await.unwrap().status, 500);
        assert_eq!(transport.calls(), 3);
    }
}
