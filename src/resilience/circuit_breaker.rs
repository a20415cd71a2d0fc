//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: backend assumed down, requests fail fast
//! - Half-Open: testing if backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: >= failure_threshold failures within monitoring window
//! Open → Half-Open: first attempt at or after next_attempt_at
//! Half-Open → Closed: success_threshold consecutive successes
//! Half-Open → Open: any failure
//! ```
//!
//! # Design Decisions
//! - Per-backend breaker, lazily created in the registry
//! - Transitions are atomic under a per-breaker mutex; the wrapped
//!   operation itself runs outside the lock
//! - Several in-flight half-open calls are allowed; any one failure
//!   re-opens
//! - A caller dropping the `execute` future mid-operation counts as a
//!   failure (the client gave up on a call the backend may never answer)

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;

/// Breaker state, in the classic three-state model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half-open",
        }
    }
}

/// Error returned by [`CircuitBreaker::execute`].
#[derive(Debug)]
pub enum BreakerError<E> {
    /// The breaker is open; the operation was not invoked.
    Open,
    /// The operation ran and failed; recorded against the breaker.
    Inner(E),
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    /// Failure timestamps within the monitoring window, oldest first.
    failures: VecDeque<Instant>,
    consecutive_failures: u32,
    consecutive_successes: u32,
    /// Meaningful only while `state` is `Open`.
    next_attempt_at: Option<Instant>,
}

/// Point-in-time view of a breaker, for the stats surface and logs.
#[derive(Debug, Clone)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub failures_in_window: usize,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub retry_in: Option<Duration>,
}

/// One breaker guarding one backend URL.
pub struct CircuitBreaker {
    backend: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(backend: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            backend: backend.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failures: VecDeque::new(),
                consecutive_failures: 0,
                consecutive_successes: 0,
                next_attempt_at: None,
            }),
        }
    }

    /// Run `op` under breaker admission, recording its outcome.
    ///
    /// When the breaker is open and the open timeout has not elapsed, `op`
    /// is never invoked and `BreakerError::Open` is returned immediately.
    /// Dropping the returned future after admission records a failure.
    pub async fn execute<T, E, F, Fut>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.try_acquire() {
            return Err(BreakerError::Open);
        }

        let mut cancel_guard = CancellationGuard {
            breaker: self,
            armed: true,
        };
        let result = op().await;
        cancel_guard.armed = false;

        match result {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure();
                Err(BreakerError::Inner(e))
            }
        }
    }

    /// Administrative reset back to closed with a clean slate.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = BreakerState::Closed;
        inner.failures.clear();
        inner.consecutive_failures = 0;
        inner.consecutive_successes = 0;
        inner.next_attempt_at = None;
        tracing::info!(backend = %self.backend, "Circuit breaker reset");
    }

    /// Current state, resolving an elapsed open timeout to the admission
    /// it would grant.
    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    /// Snapshot for the stats surface.
    pub fn stats(&self) -> BreakerSnapshot {
        let now = Instant::now();
        let inner = self.lock();
        BreakerSnapshot {
            state: inner.state,
            failures_in_window: inner.failures.len(),
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            retry_in: inner
                .next_attempt_at
                .filter(|_| inner.state == BreakerState::Open)
                .map(|at| at.saturating_duration_since(now)),
        }
    }

    /// Admission check. Transitions Open → HalfOpen once the open timeout
    /// has elapsed.
    fn try_acquire(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let now = Instant::now();
                match inner.next_attempt_at {
                    Some(at) if now < at => false,
                    _ => {
                        inner.state = BreakerState::HalfOpen;
                        inner.consecutive_successes = 0;
                        inner.next_attempt_at = None;
                        tracing::info!(backend = %self.backend, "Circuit breaker half-open, trialing backend");
                        metrics::record_breaker_transition(&self.backend, BreakerState::HalfOpen);
                        true
                    }
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = 0;
        match inner.state {
            BreakerState::Closed => {}
            BreakerState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    inner.state = BreakerState::Closed;
                    inner.failures.clear();
                    inner.consecutive_successes = 0;
                    tracing::info!(backend = %self.backend, "Circuit breaker closed, backend recovered");
                    metrics::record_breaker_transition(&self.backend, BreakerState::Closed);
                }
            }
            // A concurrent half-open failure re-opened the breaker while
            // this call was in flight; the success does not count.
            BreakerState::Open => {}
        }
    }

    fn record_failure(&self) {
        let now = Instant::now();
        let mut inner = self.lock();
        inner.consecutive_successes = 0;
        inner.consecutive_failures += 1;

        match inner.state {
            BreakerState::Closed => {
                inner.failures.push_back(now);
                let window = Duration::from_secs(self.config.monitoring_window_secs);
                while let Some(oldest) = inner.failures.front() {
                    if now.duration_since(*oldest) > window {
                        inner.failures.pop_front();
                    } else {
                        break;
                    }
                }
                if inner.failures.len() >= self.config.failure_threshold as usize {
                    self.trip(&mut inner, now);
                }
            }
            BreakerState::HalfOpen => {
                self.trip(&mut inner, now);
            }
            BreakerState::Open => {}
        }
    }

    fn trip(&self, inner: &mut BreakerInner, now: Instant) {
        inner.state = BreakerState::Open;
        inner.next_attempt_at = Some(now + Duration::from_secs(self.config.open_timeout_secs));
        tracing::warn!(
            backend = %self.backend,
            failures_in_window = inner.failures.len(),
            retry_in_secs = self.config.open_timeout_secs,
            "Circuit breaker opened"
        );
        metrics::record_breaker_transition(&self.backend, BreakerState::Open);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Records a failure if the `execute` future is dropped after admission
/// but before the operation resolved.
struct CancellationGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for CancellationGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!(backend = %self.breaker.backend, "In-flight call cancelled, recording failure");
            self.breaker.record_failure();
        }
    }
}

/// Lazily-created breakers, one per backend URL.
pub struct BreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: DashMap<String, std::sync::Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    /// Fetch the breaker for a backend, creating it on first use.
    pub fn get(&self, backend: &str) -> std::sync::Arc<CircuitBreaker> {
        self.breakers
            .entry(backend.to_string())
            .or_insert_with(|| {
                std::sync::Arc::new(CircuitBreaker::new(backend, self.config.clone()))
            })
            .clone()
    }

    /// Snapshots of every breaker created so far.
    pub fn snapshots(&self) -> Vec<(String, BreakerSnapshot)> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().stats()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 5,
            success_threshold: 2,
            monitoring_window_secs: 10,
            open_timeout_secs: 60,
        }
    }

    async fn fail(breaker: &CircuitBreaker) {
        let _ = breaker
            .execute(|| async { Err::<(), _>("boom") })
            .await;
    }

    async fn succeed(breaker: &CircuitBreaker) {
        let _ = breaker.execute(|| async { Ok::<_, &str>(()) }).await;
    }

    #[tokio::test(start_paused = true)]
    async fn trips_open_after_threshold_failures() {
        let breaker = CircuitBreaker::new("http://b.test/", config());
        for _ in 0..4 {
            fail(&breaker).await;
        }
        assert_eq!(breaker.state(), BreakerState::Closed);

        fail(&breaker).await;
        assert_eq!(breaker.state(), BreakerState::Open);

        // Open breaker rejects without invoking the operation.
        let mut invoked = false;
        let result = breaker
            .execute(|| {
                invoked = true;
                async { Ok::<_, &str>(()) }
            })
            .await;
        assert!(matches!(result, Err(BreakerError::Open)));
        assert!(!invoked);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_outside_window_do_not_trip() {
        let breaker = CircuitBreaker::new("http://b.test/", config());
        for _ in 0..4 {
            fail(&breaker).await;
        }
        // Age the recorded failures past the 10 s monitoring window.
        tokio::time::advance(Duration::from_secs(11)).await;
        fail(&breaker).await;
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn open_timeout_gates_half_open() {
        let breaker = CircuitBreaker::new("http://b.test/", config());
        for _ in 0..5 {
            fail(&breaker).await;
        }
        assert_eq!(breaker.state(), BreakerState::Open);

        // Just before the timeout: still rejecting.
        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(matches!(
            breaker.execute(|| async { Ok::<_, &str>(()) }).await,
            Err(BreakerError::Open)
        ));

        // At the timeout: the next attempt is admitted as a trial.
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(breaker
            .execute(|| async { Ok::<_, &str>(()) })
            .await
            .is_ok());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_failure_reopens() {
        let breaker = CircuitBreaker::new("http://b.test/", config());
        for _ in 0..5 {
            fail(&breaker).await;
        }
        tokio::time::advance(Duration::from_secs(60)).await;
        fail(&breaker).await;
        assert_eq!(breaker.state(), BreakerState::Open);

        // The re-open carries a fresh 60 s timeout.
        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(matches!(
            breaker.execute(|| async { Ok::<_, &str>(()) }).await,
            Err(BreakerError::Open)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn two_half_open_successes_close() {
        let breaker = CircuitBreaker::new("http://b.test/", config());
        for _ in 0..5 {
            fail(&breaker).await;
        }
        tokio::time::advance(Duration::from_secs(60)).await;

        succeed(&breaker).await;
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        succeed(&breaker).await;
        assert_eq!(breaker.state(), BreakerState::Closed);

        // Failure history was cleared: one new failure does not trip.
        fail(&breaker).await;
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_execute_counts_as_failure() {
        let breaker = CircuitBreaker::new("http://b.test/", config());
        for _ in 0..5 {
            let fut = breaker.execute(|| async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok::<_, &str>(())
            });
            tokio::pin!(fut);
            // Poll once so admission happens, then drop mid-operation.
            let _ = futures_util::poll!(fut.as_mut());
        }
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[tokio::test]
    async fn registry_is_lazy_and_idempotent() {
        let registry = BreakerRegistry::new(config());
        let a = registry.get("http://a.test/");
        let b = registry.get("http://a.test/");
        assert!(std::sync::Arc::ptr_eq(&a, &b));
        assert_eq!(registry.snapshots().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_restores_closed() {
        let breaker = CircuitBreaker::new("http://b.test/", config());
        for _ in 0..5 {
            fail(&breaker).await;
        }
        assert_eq!(breaker.state(), BreakerState::Open);
        breaker.reset();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker
            .execute(|| async { Ok::<_, &str>(()) })
            .await
            .is_ok());
    }
}
