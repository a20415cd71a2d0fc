//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → host.rs (extract + validate Host header, derive client IP)
//!     → rate_limit.rs (per-IP fixed-window admission)
//!     → headers.rs (strip hop-by-hop, add X-Forwarded-*)
//!     → Pass to routing
//!
//! Outgoing response:
//!     → headers.rs (attach the security response header set)
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any check failure before touching the backend
//! - ACME challenge requests bypass these checks so issuance always works
//! - No trust in client input beyond the forwarding headers we must honor

pub mod headers;
pub mod host;
pub mod rate_limit;

pub use rate_limit::{Decision, RateLimiter};
