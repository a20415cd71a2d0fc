//! Upstream client construction with enforced deadlines.
//!
//! The request timeout is absolute: it covers connect, response headers,
//! and body streaming. Redirects are never followed (the client sees them)
//! and the environment proxy settings are ignored; this process IS the
//! proxy.

use std::time::Duration;

use crate::config::TimeoutConfig;

/// Build the shared upstream HTTP client for the proxy engine.
pub fn upstream_client(timeouts: &TimeoutConfig) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .connect_timeout(Duration::from_secs(timeouts.connect_secs))
        .timeout(Duration::from_secs(timeouts.request_secs))
        .pool_idle_timeout(Duration::from_secs(timeouts.idle_secs))
        .build()
}
