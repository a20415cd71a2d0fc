//! Retry classification and schedule.

use std::time::Duration;

use crate::config::RetryConfig;
use crate::resilience::backoff::retry_backoff;

/// Why a single upstream attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The backend's circuit breaker rejected the attempt outright.
    BreakerOpen,
    /// The overall upstream deadline elapsed.
    Timeout,
    /// Connect or transport error before a response arrived.
    Network,
    /// The backend answered with a 5xx status.
    UpstreamStatus,
}

impl FailureKind {
    /// Whether this failure class is eligible for a retry. 4xx responses
    /// never reach this classification; they are returned to the client
    /// as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FailureKind::BreakerOpen
                | FailureKind::Timeout
                | FailureKind::Network
                | FailureKind::UpstreamStatus
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::BreakerOpen => "breaker_open",
            FailureKind::Timeout => "timeout",
            FailureKind::Network => "network",
            FailureKind::UpstreamStatus => "upstream_status",
        }
    }
}

/// Attempt budget and backoff schedule for one request.
#[derive(Debug, Clone, Copy)]
pub struct RetrySchedule {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetrySchedule {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }

    /// Delay to sleep before attempt number `attempt` (1-based), or `None`
    /// when the budget is exhausted. The first attempt is never delayed.
    pub fn delay_before(&self, attempt: u32) -> Option<Duration> {
        if attempt <= 1 {
            return Some(Duration::ZERO);
        }
        if attempt > self.max_attempts {
            return None;
        }
        Some(retry_backoff(attempt - 1, self.base_delay))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_follows_exponential_base() {
        let schedule = RetrySchedule::new(&RetryConfig {
            max_attempts: 3,
            base_delay_ms: 100,
        });

        assert_eq!(schedule.delay_before(1), Some(Duration::ZERO));
        assert_eq!(schedule.delay_before(2), Some(Duration::from_millis(100)));
        assert_eq!(schedule.delay_before(3), Some(Duration::from_millis(200)));
        assert_eq!(schedule.delay_before(4), None);
    }

    #[test]
    fn all_failure_kinds_are_retryable() {
        for kind in [
            FailureKind::BreakerOpen,
            FailureKind::Timeout,
            FailureKind::Network,
            FailureKind::UpstreamStatus,
        ] {
            assert!(kind.is_retryable());
        }
    }
}
