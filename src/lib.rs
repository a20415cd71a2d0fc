//! Host-based HTTP/HTTPS reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                          ┌────────────────────────────────────────────────────┐
//!                          │                      RPROXY                        │
//!                          │                                                    │
//!     Client Request       │  ┌─────────┐   ┌─────────┐   ┌──────────────┐     │
//!     ─────────────────────┼─▶│   net   │──▶│  http   │──▶│   routing    │     │
//!     :80 / :443           │  │listener │   │ server  │   │    table     │     │
//!                          │  └─────────┘   └────┬────┘   └──────┬───────┘     │
//!                          │                     │               │             │
//!                          │          ┌──────────┴───┐           ▼             │
//!                          │          │ acme / host  │   ┌──────────────┐      │
//!                          │          │ check / rate │   │ proxy engine │◀─────┼──── Backend
//!                          │          │    limit     │   │ (forwarding) │      │
//!                          │          └──────────────┘   └──────┬───────┘      │
//!                          │                                    │              │
//!                          │  ┌──────────────────────────────────────────────┐ │
//!                          │  │            Cross-Cutting Concerns            │ │
//!                          │  │  ┌────────┐ ┌────────┐ ┌────────┐ ┌───────┐  │ │
//!                          │  │  │ config │ │ health │ │ resil- │ │ stats │  │ │
//!                          │  │  │        │ │ checks │ │ ience  │ │       │  │ │
//!                          │  │  └────────┘ └────────┘ └────────┘ └───────┘  │ │
//!                          │  │  ┌─────────────────┐  ┌────────────────────┐ │ │
//!                          │  │  │    lifecycle    │  │   observability    │ │ │
//!                          │  │  │ signals/reload  │  │  logging/metrics   │ │ │
//!                          │  │  └─────────────────┘  └────────────────────┘ │ │
//!                          │  └──────────────────────────────────────────────┘ │
//!                          └────────────────────────────────────────────────────┘
//! ```
//!
//! Every request is admitted through the same pipeline: ACME challenge
//! short-circuit, Host header extraction and validation, per-IP rate
//! limiting, route lookup, then forwarding through the backend's circuit
//! breaker with retries. The three listeners (public plain, public TLS,
//! internal stats) are owned by the [`lifecycle::Supervisor`].

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod routing;

// Traffic management
pub mod acme;
pub mod health;
pub mod resilience;
pub mod security;

// Cross-cutting concerns
pub mod error;
pub mod lifecycle;
pub mod observability;

pub use config::ProxyConfig;
pub use error::ProxyError;
pub use http::server::AppState;
pub use lifecycle::{Shutdown, Supervisor};
