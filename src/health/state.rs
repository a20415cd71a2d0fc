//! Backend health state machine.
//!
//! # Design Decisions
//! - A backend starts healthy; only evidence marks it down
//! - Hysteresis on the way down (threshold of consecutive failures),
//!   immediate recovery on the way up (any success)
//! - Counters reset on every transition

use chrono::{DateTime, Utc};

/// Health record for one backend under observation.
#[derive(Debug, Clone)]
pub struct BackendHealth {
    pub healthy: bool,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub last_check_at: Option<DateTime<Utc>>,
    pub response_time_ms: Option<u64>,
    pub last_error: Option<String>,
}

impl BackendHealth {
    pub fn new() -> Self {
        Self {
            healthy: true,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_check_at: None,
            response_time_ms: None,
            last_error: None,
        }
    }

    /// Record a successful probe. Returns true when this flipped the
    /// backend back to healthy.
    pub fn record_success(&mut self, response_time_ms: u64) -> bool {
        let recovered = !self.healthy;
        self.healthy = true;
        self.consecutive_failures = 0;
        self.consecutive_successes += 1;
        self.last_check_at = Some(Utc::now());
        self.response_time_ms = Some(response_time_ms);
        self.last_error = None;
        recovered
    }

    /// Record a failed probe. Returns true when this flipped the backend
    /// to unhealthy (consecutive failures reached `threshold`).
    pub fn record_failure(&mut self, error: String, threshold: u32) -> bool {
        self.consecutive_successes = 0;
        self.consecutive_failures += 1;
        self.last_check_at = Some(Utc::now());
        self.last_error = Some(error);

        let flipped = self.healthy && self.consecutive_failures >= threshold;
        if flipped {
            self.healthy = false;
        }
        flipped
    }

    /// Force the backend unhealthy, bypassing the threshold. Used by the
    /// proxy engine when request-path failures are observed.
    pub fn force_unhealthy(&mut self, reason: String) -> bool {
        let flipped = self.healthy;
        self.healthy = false;
        self.consecutive_successes = 0;
        self.consecutive_failures += 1;
        self.last_check_at = Some(Utc::now());
        self.last_error = Some(reason);
        flipped
    }
}

impl Default for BackendHealth {
    fn default() -> Self {
        Self::new()
    }
}
