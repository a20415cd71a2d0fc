//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! <config-root>/rproxy.toml (optional)
//!     → loader.rs (parse & deserialize; defaults when absent)
//!     → environment overrides (RPROXY_DATA_DIR, LOG_LEVEL)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; SIGHUP reloads routes, not config
//! - All fields have defaults so the proxy runs with no config file at all
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    CircuitBreakerConfig, HealthCheckConfig, ListenerConfig, ObservabilityConfig, PathsConfig,
    ProxyConfig, RateLimitConfig, RetryConfig, StatsConfig, TimeoutConfig,
};
