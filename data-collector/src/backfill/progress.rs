//! Live progress counters shared by the workers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::time::Instant;
use tracing::info;

use crate::schema::TaskOutcome;

/// Point-in-time view of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub records_fetched: usize,
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    /// Completed tasks per second.
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            0.0
        } else {
            self.completed as f64 / secs
        }
    }

    pub fn records_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            0.0
        } else {
            self.records_fetched as f64 / secs
        }
    }

    /// Projected time to finish the remaining tasks at the current rate.
    pub fn eta(&self) -> Option<Duration> {
        let remaining = self.total.saturating_sub(self.completed);
        if remaining == 0 {
            return Some(Duration::ZERO);
        }
        let rate = self.rate();
        if rate <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining as f64 / rate))
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.completed as f64 * 100.0 / self.total as f64
        }
    }
}

pub struct RunProgress {
    source: String,
    total: usize,
    progress_every: usize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    records_fetched: AtomicUsize,
    started: Instant,
}

impl RunProgress {
    pub fn new(source: impl Into<String>, total: usize, progress_every: usize) -> Self {
        Self {
            source: source.into(),
            total,
            progress_every: progress_every.max(1),
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            records_fetched: AtomicUsize::new(0),
            started: Instant::now(),
        }
    }

    /// Count a finished task and log a progress line every
    /// `progress_every` completions.
    pub fn record(&self, outcome: &TaskOutcome) {
        if !outcome.is_success() {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.records_fetched
            .fetch_add(outcome.record_count, Ordering::Relaxed);
        let completed = self.completed.fetch_add(1, Ordering::Relaxed) + 1;

        if completed % self.progress_every == 0 || completed == self.total {
            let snap = self.snapshot();
            let eta = snap
                .eta()
                .map(|d| format!("{}s", d.as_secs()))
                .unwrap_or_else(|| "?".to_string());
            info!(
                source = %self.source,
                "Progress {}/{} ({:.1}%) | records {} | {:.1} rec/s | failed {} | ETA {}",
                snap.completed,
                snap.total,
                snap.percent(),
                snap.records_fetched,
                snap.records_per_sec(),
                snap.failed,
                eta
            );
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total: self.total,
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            records_fetched: self.records_fetched.load(Ordering::Relaxed),
            elapsed: self.started.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FetchTask, TimeWindow};
    use chrono::{Duration as ChronoDuration, Utc};

    fn outcome(ok: bool, records: usize) -> TaskOutcome {
        let now = Utc::now();
        let task = FetchTask {
            id: 0,
            entities: vec!["x".into()],
            scope: None,
            window: TimeWindow::new(now, now + ChronoDuration::days(1)).unwrap(),
        };
        if ok {
            TaskOutcome::succeeded(task, records, 1)
        } else {
            TaskOutcome::failed(task, 3, "boom")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_rate_and_eta() {
        let progress = RunProgress::new("mock", 10, 5);
        tokio::time::advance(Duration::from_secs(4)).await;
        for _ in 0..4 {
            progress.record(&outcome(true, 10));
        }
        progress.record(&outcome(false, 0));

        let snap = progress.snapshot();
        assert_eq!(snap.completed, 5);
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.records_fetched, 40);
        assert_eq!(snap.elapsed, Duration::from_secs(4));
        assert!((snap.rate() - 1.25).abs() < 1e-9);
        assert_eq!(snap.eta(), Some(Duration::from_secs(4)));
        assert!((snap.percent() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_eta_unknown_before_any_progress() {
        let snap = ProgressSnapshot {
            total: 3,
            completed: 0,
            failed: 0,
            records_fetched: 0,
            elapsed: Duration::from_secs(2),
        };
        assert_eq!(snap.eta(), None);
        assert_eq!(snap.rate(), 0.0);
    }
}
