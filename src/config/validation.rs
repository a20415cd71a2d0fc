//! Configuration validation logic.

use std::net::SocketAddr;

use crate::config::schema::ProxyConfig;

/// Error type for configuration validation failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Validation error: {}", self.0)
    }
}

/// Validate a ProxyConfig for semantic correctness.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    // 1. Bind addresses must parse.
    for (name, addr) in [
        ("listener.http_address", &config.listener.http_address),
        ("listener.https_address", &config.listener.https_address),
        ("stats.bind_address", &config.stats.bind_address),
    ] {
        if addr.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError(format!(
                "{} is not a valid socket address: '{}'",
                name, addr
            )));
        }
    }

    // 2. Rate limiter bounds.
    if config.rate_limit.max_requests == 0 {
        errors.push(ValidationError(
            "rate_limit.max_requests must be > 0".to_string(),
        ));
    }
    if config.rate_limit.window_secs == 0 {
        errors.push(ValidationError(
            "rate_limit.window_secs must be > 0".to_string(),
        ));
    }
    if config.rate_limit.max_tracked_clients == 0 {
        errors.push(ValidationError(
            "rate_limit.max_tracked_clients must be > 0".to_string(),
        ));
    }

    // 3. Breaker thresholds.
    if config.circuit_breaker.failure_threshold == 0 {
        errors.push(ValidationError(
            "circuit_breaker.failure_threshold must be > 0".to_string(),
        ));
    }
    if config.circuit_breaker.success_threshold == 0 {
        errors.push(ValidationError(
            "circuit_breaker.success_threshold must be > 0".to_string(),
        ));
    }
    if config.circuit_breaker.monitoring_window_secs == 0 {
        errors.push(ValidationError(
            "circuit_breaker.monitoring_window_secs must be > 0".to_string(),
        ));
    }

    // 4. Health check thresholds.
    if config.health_check.unhealthy_threshold == 0 {
        errors.push(ValidationError(
            "health_check.unhealthy_threshold must be > 0".to_string(),
        ));
    }
    if !config.health_check.path.starts_with('/') {
        errors.push(ValidationError(format!(
            "health_check.path must start with '/': '{}'",
            config.health_check.path
        )));
    }

    // 5. Retries.
    if config.retries.max_attempts == 0 {
        errors.push(ValidationError(
            "retries.max_attempts must be > 0".to_string(),
        ));
    }

    if config.timeouts.request_secs == 0 {
        tracing::warn!("timeouts.request_secs is 0; upstream requests will time out immediately");
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
