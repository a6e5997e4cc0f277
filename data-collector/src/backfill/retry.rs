//! Retry policy applied uniformly by the fetcher.

use std::time::Duration;

use crate::provider::RateProfile;

/// Upper bound on any single wait.
pub const MAX_BACKOFF: Duration = Duration::from_secs(600);

/// Why a task is being retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    /// HTTP 429 or a provider-specific throttle message
    RateLimited,
    /// 5xx, timeout, connection failure
    Transient,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per task, first attempt included
    pub max_attempts: u32,
    pub base_backoff: f64,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_profile(&RateProfile::default())
    }
}

impl RetryPolicy {
    pub fn from_profile(profile: &RateProfile) -> Self {
        Self {
            max_attempts: profile.max_attempts.max(1),
            base_backoff: profile.base_backoff,
            retry_delay: profile.retry_delay,
        }
    }

    /// Whether another attempt may follow attempt number `attempt` (1-based).
    pub fn allows_another(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Wait after failed attempt number `attempt` (1-based).
    ///
    /// Rate-limited: `base_backoff^attempt` seconds, or the provider's
    /// `Retry-After` when that is longer. Transient: `retry_delay * attempt`.
    pub fn delay_for(&self, reason: RetryReason, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let computed = match reason {
            RetryReason::RateLimited => {
                let secs = self.base_backoff.max(1.0).powi(attempt as i32);
                let backoff = if secs.is_finite() {
                    Duration::from_secs_f64(secs.min(MAX_BACKOFF.as_secs_f64()))
                } else {
                    MAX_BACKOFF
                };
                retry_after.map_or(backoff, |ra| ra.max(backoff))
            }
            RetryReason::Transient => self.retry_delay.saturating_mul(attempt),
        };
        computed.min(MAX_BACKOFF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_backoff: 2.0,
            retry_delay: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_attempt_budget_counts_first_attempt() {
        let p = policy(3);
        assert!(p.allows_another(1));
        assert!(p.allows_another(2));
        assert!(!p.allows_another(3));
    }

    #[test]
    fn test_rate_limited_backoff_is_exponential() {
        let p = policy(5);
        assert_eq!(p.delay_for(RetryReason::RateLimited, 1, None), Duration::from_secs(2));
        assert_eq!(p.delay_for(RetryReason::RateLimited, 2, None), Duration::from_secs(4));
        assert_eq!(p.delay_for(RetryReason::RateLimited, 3, None), Duration::from_secs(8));
    }

    #[test]
    fn test_retry_after_wins_when_longer() {
        let p = policy(5);
        let wait = p.delay_for(RetryReason::RateLimited, 1, Some(Duration::from_secs(30)));
        assert_eq!(wait, Duration::from_secs(30));
        let wait = p.delay_for(RetryReason::RateLimited, 3, Some(Duration::from_secs(1)));
        assert_eq!(wait, Duration::from_secs(8));
    }

    #[test]
    fn test_transient_backoff_is_linear() {
        let p = policy(5);
        assert_eq!(p.delay_for(RetryReason::Transient, 1, None), Duration::from_secs(1));
        assert_eq!(p.delay_for(RetryReason::Transient, 3, None), Duration::from_secs(3));
    }

    #[test]
    fn test_backoff_is_non_decreasing_and_capped() {
        let p = policy(50);
        let waits: Vec<Duration> = (1..50)
            .map(|a| p.delay_for(RetryReason::RateLimited, a, None))
            .collect();
        assert!(waits.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*waits.last().unwrap(), MAX_BACKOFF);
    }

    #[test]
    fn test_zero_attempts_still_allows_one() {
        let profile = RateProfile::default().with_max_attempts(0);
        assert_eq!(RetryPolicy::from_profile(&profile).max_attempts, 1);
    }
}
