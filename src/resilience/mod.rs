//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to backend:
//!     → timeouts.rs (upstream client with connect/request deadlines)
//!     → circuit_breaker.rs (admission + outcome recording per backend)
//!     → On failure: retries.rs + backoff.rs (classify, delay, re-attempt)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every upstream call has a deadline
//! - Retries only for failures that precede the backend doing work
//!   (breaker rejection, connect error, timeout) or 5xx — never 4xx
//! - Circuit breaker prevents cascading failures; one breaker per backend

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{BreakerError, BreakerRegistry, BreakerState, CircuitBreaker};
pub use retries::{FailureKind, RetrySchedule};
