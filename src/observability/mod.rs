//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters and gauges, Prometheus exporter optional)
//!     → stats.rs (request counters behind the internal JSON endpoints)
//! ```
//!
//! # Design Decisions
//! - The JSON stats endpoints are product surface, served on loopback only
//! - The Prometheus exporter is opt-in and bound separately
//! - Counter updates are atomic increments; never on a lock in the hot path

pub mod logging;
pub mod metrics;
pub mod stats;

pub use stats::{StatsSink, StatsSnapshot};
