//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (supervisor.rs):
//!     Bind plain listener → TLS listener if certs exist → stats listener
//!     → start health probers for every routed backend
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → graceful shutdown
//!     SIGHUP → reload routes, reconcile probers; listeners keep sockets
//!
//! Shutdown (shutdown.rs + supervisor.rs):
//!     Stop accept loops → stop probers → drain in-flight connections
//!     up to the grace period → exit
//! ```
//!
//! # Design Decisions
//! - Listeners are never rebound on reload; no connection is dropped
//! - Ordered shutdown: stop accept, stop probers, drain, close
//! - Drain is bounded by a grace period; forced exit after the deadline

pub mod shutdown;
pub mod signals;
pub mod supervisor;

pub use shutdown::Shutdown;
pub use signals::{LifecycleEvent, Signals};
pub use supervisor::Supervisor;
