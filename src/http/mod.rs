//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (router, admission pipeline, request ID, tracing)
//!     → ACME short-circuit | host checks | rate limit
//!     → routing table lookup
//!     → proxy.rs (forward through breaker with retries)
//!     → response back to client with security headers
//! ```

pub mod proxy;
pub mod request;
pub mod server;

pub use proxy::{ProxyEngine, RequestContext};
pub use request::{propagate_request_id_layer, set_request_id_layer, X_REQUEST_ID};
pub use server::{build_router, AppState, ListenerScheme};
