//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the reverse proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind addresses, connection limits).
    pub listener: ListenerConfig,

    /// Internal stats endpoint configuration.
    pub stats: StatsConfig,

    /// Filesystem roots for routes, certificates and ACME challenges.
    pub paths: PathsConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Per-IP rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Upstream retry configuration.
    pub retries: RetryConfig,

    /// Per-backend circuit breaker configuration.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Active health check settings.
    pub health_check: HealthCheckConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Plain HTTP bind address.
    pub http_address: String,

    /// HTTPS bind address; only used when certificate material exists.
    pub https_address: String,

    /// Maximum concurrent connections per public listener (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            http_address: "0.0.0.0:80".to_string(),
            https_address: "0.0.0.0:443".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Internal stats endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Bind address for `/internal/stats` and `/internal/health`.
    /// Loopback only; never expose this publicly.
    pub bind_address: String,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Filesystem roots.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding the route table file.
    pub config_dir: PathBuf,

    /// Directory holding certificates and ACME challenge files.
    /// Overridable via the `RPROXY_DATA_DIR` environment variable.
    pub data_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from("/etc/rproxy"),
            data_dir: PathBuf::from("/var/lib/rproxy"),
        }
    }
}

impl PathsConfig {
    /// Path of the persisted route table.
    pub fn routes_file(&self) -> PathBuf {
        self.config_dir.join("routes.json")
    }

    /// Path of the TLS private key.
    pub fn tls_key(&self) -> PathBuf {
        self.data_dir.join("certs").join("privkey.pem")
    }

    /// Path of the TLS certificate chain.
    pub fn tls_cert(&self) -> PathBuf {
        self.data_dir.join("certs").join("fullchain.pem")
    }

    /// Root directory served by the ACME challenge handler.
    pub fn acme_challenge_dir(&self) -> PathBuf {
        self.data_dir.join("acme-challenges")
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Absolute upstream deadline in seconds (connect + headers + body).
    pub request_secs: u64,

    /// Idle upstream connection timeout in seconds.
    pub idle_secs: u64,

    /// Grace period for in-flight requests during shutdown, in seconds.
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
            idle_secs: 60,
            shutdown_grace_secs: 30,
        }
    }
}

/// Per-IP rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum requests per client per window.
    pub max_requests: u32,

    /// Window length in seconds.
    pub window_secs: u64,

    /// Upper bound on tracked client entries; least-recently-touched
    /// entries are evicted past this.
    pub max_tracked_clients: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window_secs: 60,
            max_tracked_clients: 10_000,
        }
    }
}

/// Upstream retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per request, including the first.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
        }
    }
}

/// Per-backend circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failures within the monitoring window that trip the breaker.
    pub failure_threshold: u32,

    /// Consecutive half-open successes that close the breaker.
    pub success_threshold: u32,

    /// Sliding window over which failures are counted, in seconds.
    pub monitoring_window_secs: u64,

    /// How long an open breaker rejects before allowing a trial, in seconds.
    pub open_timeout_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            monitoring_window_secs: 10,
            open_timeout_secs: 60,
        }
    }
}

/// Active health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Probe interval in seconds.
    pub interval_secs: u64,

    /// Per-leg probe timeout in seconds.
    pub timeout_secs: u64,

    /// Path probed on each backend.
    pub path: String,

    /// Consecutive probe failures before marking unhealthy.
    pub unhealthy_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            timeout_secs: 5,
            path: "/health".to_string(),
            unhealthy_threshold: 3,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    /// Overridable via the `LOG_LEVEL` environment variable.
    pub log_level: String,

    /// Enable the Prometheus metrics exporter.
    pub metrics_enabled: bool,

    /// Metrics exporter bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9091".to_string(),
        }
    }
}
