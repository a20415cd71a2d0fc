//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (validated host)
//!     → table.rs (point lookup: host → Route)
//!     → Return: Route or explicit no-route
//!
//! Route ingestion (file load / insert):
//!     raw host, raw backend
//!     → route.rs (lowercase host, default http:// scheme)
//!     → committed to the table, last-writer-wins per host
//! ```
//!
//! # Design Decisions
//! - One host maps to exactly one backend URL
//! - Lock-free reads via an atomically swapped snapshot; writers serialize
//! - Reload replaces the whole mapping in one step, readers never observe
//!   a half-applied table

pub mod route;
pub mod table;

pub use route::{Route, RouteError};
pub use table::RouteTable;
