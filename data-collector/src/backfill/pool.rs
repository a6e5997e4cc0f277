//! Bounded-concurrency worker pool draining a shared task queue.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::fetcher::{FetchResult, Fetcher};
use super::progress::RunProgress;
use crate::schema::{CanonicalRecord, FetchTask, TaskOutcome};

/// Aggregated output of a drained queue. Results are ordered by task id
/// so later windows come after earlier ones regardless of completion order.
#[derive(Debug, Default)]
pub struct PoolOutput {
    pub outcomes: Vec<TaskOutcome>,
    pub records: Vec<CanonicalRecord>,
}

pub struct WorkerPool {
    concurrency: usize,
}

impl WorkerPool {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run every task through `fetcher`. Returns once the queue is empty and
    /// all in-flight tasks have reported.
    pub async fn run(
        &self,
        tasks: Vec<FetchTask>,
        fetcher: Arc<Fetcher>,
        progress: Arc<RunProgress>,
    ) -> PoolOutput {
        if tasks.is_empty() {
            return PoolOutput::default();
        }

        let workers = self.concurrency.min(tasks.len());
        let queue = Arc::new(Mutex::new(VecDeque::from(tasks)));
        let (tx, mut rx) = mpsc::unbounded_channel::<FetchResult>();

        info!(workers, "Starting worker pool");

        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let queue = queue.clone();
                let fetcher = fetcher.clone();
                let progress = progress.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    loop {
                        let next = queue.lock().pop_front();
                        let Some(task) = next else { break };
                        debug!(worker, task = task.id, "Picked up task");
                        let result = fetcher.fetch(task).await;
                        progress.record(&result.outcome);
                        if tx.send(result).is_err() {
                            break;
                        }
                    }
                    debug!(worker, "Worker finished");
                })
            })
            .collect();
        drop(tx);

        let mut results = Vec::new();
        while let Some(result) = rx.recv().await {
            results.push(result);
        }

        for joined in join_all(handles).await {
            if let Err(e) = joined {
                error!("Worker terminated abnormally: {}", e);
            }
        }

        results.sort_by_key(|r| r.outcome.task.id);
        let mut output = PoolOutput::default();
        for result in results {
            output.records.extend(result.records);
            output.outcomes.push(result.outcome);
        }
        output
    }
}
