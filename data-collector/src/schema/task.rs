//! Units of work and their lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::TimeWindow;

/// A provider entity (coin id, ticker, protocol slug) plus the scope it is
/// requested under. The scope is provider-specific: a metric for Artemis,
/// an exchange for Velo, an endpoint for DefiLlama.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntitySpec {
    pub id: String,
    #[serde(default)]
    pub scope: Option<String>,
}

impl EntitySpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            scope: None,
        }
    }

    pub fn scoped(id: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            scope: Some(scope.into()),
        }
    }
}

impl fmt::Display for EntitySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Some(scope) => write!(f, "{}@{}", self.id, scope),
            None => f.write_str(&self.id),
        }
    }
}

/// One planned request: an entity batch over one window. Built by the
/// planner and consumed exactly once by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTask {
    pub id: usize,
    pub entities: Vec<String>,
    pub scope: Option<String>,
    pub window: TimeWindow,
}

impl FetchTask {
    /// Human label used in logs and the failure list.
    pub fn label(&self) -> String {
        let entities = self.entities.join(",");
        match &self.scope {
            Some(scope) => format!("{} [{}] {}", entities, scope, self.window),
            None => format!("{} {}", entities, self.window),
        }
    }
}

/// Lifecycle of a task inside the fetcher.
///
/// `Queued -> InFlight -> {Succeeded, RetryPending -> Queued, FailedFinal}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Queued,
    InFlight,
    RetryPending,
    Succeeded,
    FailedFinal,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::FailedFinal)
    }

    pub fn can_transition_to(&self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Queued, InFlight)
                | (InFlight, Succeeded)
                | (InFlight, RetryPending)
                | (InFlight, FailedFinal)
                | (RetryPending, Queued)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Succeeded,
    Failed,
}

/// Final report of one task.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub task: FetchTask,
    pub status: TaskStatus,
    pub record_count: usize,
    pub attempts: u32,
    pub error: Option<String>,
}

impl TaskOutcome {
    pub fn succeeded(task: FetchTask, record_count: usize, attempts: u32) -> Self {
        Self {
            task,
            status: TaskStatus::Succeeded,
            record_count,
            attempts,
            error: None,
        }
    }

    pub fn failed(task: FetchTask, attempts: u32, error: impl Into<String>) -> Self {
        Self {
            task,
            status: TaskStatus::Failed,
            record_count: 0,
            attempts,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Succeeded
    }
}
