//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → tls.rs (optional TLS handshake on :443)
//!     → Hand off to the HTTP layer
//! ```

pub mod listener;
pub mod tls;

pub use listener::{ConnectionPermit, Listener, ListenerError};
