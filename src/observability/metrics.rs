//! Metrics collection and exposition.
//!
//! Recording helpers are cheap no-ops until the Prometheus exporter is
//! installed, so every subsystem records unconditionally.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::circuit_breaker::BreakerState;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        tracing::error!(address = %addr, error = %e, "Failed to install Prometheus recorder");
        return;
    }
    tracing::info!("Metrics server listening on http://{}", addr);
}

/// Record one proxied request outcome.
pub fn record_request(host: &str, status: u16) {
    let labels = [
        ("host", host.to_string()),
        ("status", status.to_string()),
    ];
    counter!("rproxy_requests_total", &labels).increment(1);
}

/// Record a rate-limited rejection.
pub fn record_rate_limited() {
    counter!("rproxy_rate_limited_total").increment(1);
}

/// Record a circuit breaker transition.
pub fn record_breaker_transition(backend: &str, state: BreakerState) {
    counter!(
        "rproxy_breaker_transitions_total",
        "backend" => backend.to_string(),
        "state" => state.as_str()
    )
    .increment(1);
}

/// Record backend health as a gauge (1 healthy, 0 unhealthy).
pub fn record_backend_health(backend: &str, healthy: bool) {
    let value = if healthy { 1.0 } else { 0.0 };
    gauge!("rproxy_backend_healthy", "backend" => backend.to_string()).set(value);
}
