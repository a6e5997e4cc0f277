//! Shared request throttle.
//!
//! One limiter is owned by the run and handed to every worker. The steady
//! gate spaces grants at least `1/rate` apart; an optional window quota
//! (N per minute / per day) sits behind the same `acquire()`.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use governor::{
    clock::DefaultClock,
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorRateLimiter,
};
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::provider::{QuotaPeriod, WindowQuota};
use collector_common::error::ConfigurationError;

type QuotaLimiter = GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

const SECONDS_PER_DAY: u64 = 86_400;

pub struct RateLimiter {
    interval: Duration,
    /// Time of the most recent grant (possibly in the future for callers
    /// that reserved a slot and are still sleeping towards it)
    last_grant: Mutex<Option<Instant>>,
    quota: Option<QuotaLimiter>,
    grants: AtomicU64,
}

impl RateLimiter {
    /// Limiter granting at most `requests_per_sec` requests per second.
    pub fn new(requests_per_sec: f64) -> Result<Self, ConfigurationError> {
        if !requests_per_sec.is_finite() || requests_per_sec <= 0.0 {
            return Err(ConfigurationError::invalid_value(
                "requests_per_sec",
                format!("must be a positive number, got {}", requests_per_sec),
            ));
        }
        Ok(Self {
            interval: Duration::from_secs_f64(1.0 / requests_per_sec),
            last_grant: Mutex::new(None),
            quota: None,
            grants: AtomicU64::new(0),
        })
    }

    /// Add a window quota on top of the steady rate.
    pub fn with_quota(mut self, quota: WindowQuota) -> Result<Self, ConfigurationError> {
        let requests = NonZeroU32::new(quota.requests).ok_or_else(|| {
            ConfigurationError::invalid_value("quota.requests", "must be greater than zero")
        })?;
        let quota = match quota.period {
            QuotaPeriod::Minute => Quota::per_minute(requests),
            QuotaPeriod::Day => {
                let period = Duration::from_secs(SECONDS_PER_DAY / u64::from(requests.get()));
                Quota::with_period(period)
                    .ok_or_else(|| {
                        ConfigurationError::invalid_value("quota.requests", "too many per day")
                    })?
                    .allow_burst(requests)
            }
        };
        self.quota = Some(GovernorRateLimiter::direct(quota));
        Ok(self)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Total grants handed out so far.
    pub fn grants(&self) -> u64 {
        self.grants.load(Ordering::Relaxed)
    }

    /// Wait until the caller may issue one request.
    ///
    /// The slot is reserved under the lock (read `last_grant`, compute the
    /// next slot, store it) and the sleep happens after the lock is released,
    /// so concurrent callers queue up on distinct slots.
    pub async fn acquire(&self) {
        if let Some(quota) = &self.quota {
            quota.until_ready().await;
        }

        let slot = {
            let mut last = self.last_grant.lock();
            let now = Instant::now();
            let next = match *last {
                Some(prev) => (prev + self.interval).max(now),
                None => now,
            };
            *last = Some(next);
            next
        };

        let n = self.grants.fetch_add(1, Ordering::Relaxed) + 1;
        if slot > Instant::now() {
            trace!(grant = n, wait = ?(slot - Instant::now()), "Waiting for rate limiter slot");
            tokio::time::sleep_until(slot).await;
        } else {
            debug!(grant = n, "Rate limiter slot granted");
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("interval", &self.interval)
            .field("quota", &self.quota.is_some())
            .field("grants", &self.grants())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn max_grants_in_any_second(mut times: Vec<Instant>) -> usize {
        times.sort();
        (0..times.len())
            .map(|i| {
                times[i..]
                    .iter()
                    .take_while(|t| **t - times[i] < Duration::from_secs(1))
                    .count()
            })
            .max()
            .unwrap_or(0)
    }

    async fn grant_times(limiter: Arc<RateLimiter>, workers: usize, per_worker: usize) -> Vec<Instant> {
        let mut handles = Vec::new();
        for _ in 0..workers {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                let mut times = Vec::new();
                for _ in 0..per_worker {
                    limiter.acquire().await;
                    times.push(Instant::now());
                }
                times
            }));
        }
        let mut all = Vec::new();
        for h in handles {
            all.extend(h.await.unwrap());
        }
        all
    }

    #[tokio::test(start_paused = true)]
    async fn test_grants_never_exceed_rate_per_second() {
        let limiter = Arc::new(RateLimiter::new(5.0).unwrap());
        let times = grant_times(limiter.clone(), 8, 10).await;

        assert_eq!(times.len(), 80);
        assert_eq!(limiter.grants(), 80);
        assert!(max_grants_in_any_second(times) <= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fractional_rate() {
        let limiter = Arc::new(RateLimiter::new(0.5).unwrap());
        let start = Instant::now();
        let times = grant_times(limiter, 3, 2).await;

        assert!(max_grants_in_any_second(times.clone()) <= 1);
        let last = times.into_iter().max().unwrap();
        // six grants at 2s spacing: 0, 2, 4, 6, 8, 10
        assert_eq!(last - start, Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_grant_is_immediate() {
        let limiter = RateLimiter::new(1.0).unwrap();
        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(Instant::now(), start);
        limiter.acquire().await;
        assert_eq!(Instant::now() - start, Duration::from_secs(1));
    }

    #[test]
    fn test_invalid_rates_are_rejected() {
        assert!(RateLimiter::new(0.0).is_err());
        assert!(RateLimiter::new(-1.0).is_err());
        assert!(RateLimiter::new(f64::NAN).is_err());
    }

    #[test]
    fn test_zero_quota_is_rejected() {
        let limiter = RateLimiter::new(1.0).unwrap();
        assert!(limiter.with_quota(WindowQuota::per_day(0)).is_err());
    }

    #[tokio::test]
    async fn test_quota_burst_is_available_immediately() {
        let limiter = RateLimiter::new(1000.0)
            .unwrap()
            .with_quota(WindowQuota::per_day(25))
            .unwrap();
        let result = tokio::time::timeout(Duration::from_secs(2), async {
            for _ in 0..5 {
                limiter.acquire().await;
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(limiter.grants(), 5);
    }
}
