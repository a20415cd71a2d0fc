//! Active health checking.
//!
//! One background prober task per backend URL: an immediate probe on
//! start, then one probe every `interval_secs` (with a little jitter so a
//! fleet of probers does not synchronize). The probe is two-legged:
//! `GET <backend>/health` first, and on failure one `HEAD <backend>/`
//! fallback under the same per-leg timeout. Only both legs failing counts
//! as a probe failure; a missing health endpoint (404) counts as success.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use url::Url;

use crate::config::HealthCheckConfig;
use crate::health::state::BackendHealth;
use crate::observability::metrics;
use crate::resilience::backoff::jittered;

/// User agent distinguishing probes from proxied traffic in backend logs.
const PROBE_USER_AGENT: &str = concat!("rproxy-health/", env!("CARGO_PKG_VERSION"));

/// Owns the prober tasks and the shared health status table.
pub struct HealthChecker {
    config: HealthCheckConfig,
    client: reqwest::Client,
    statuses: Arc<DashMap<String, BackendHealth>>,
    probers: DashMap<String, JoinHandle<()>>,
}

impl HealthChecker {
    pub fn new(config: HealthCheckConfig) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(PROBE_USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .no_proxy()
            .build()?;
        Ok(Self {
            config,
            client,
            statuses: Arc::new(DashMap::new()),
            probers: DashMap::new(),
        })
    }

    /// Start probing a backend. Idempotent: a second call for the same
    /// backend URL is a no-op.
    pub fn start(&self, backend: &Url) {
        let key = backend.to_string();
        match self.probers.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {}
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                self.statuses
                    .entry(key.clone())
                    .or_insert_with(BackendHealth::new);

                let prober = Prober {
                    backend: backend.clone(),
                    key: key.clone(),
                    config: self.config.clone(),
                    client: self.client.clone(),
                    statuses: Arc::clone(&self.statuses),
                };
                slot.insert(tokio::spawn(prober.run()));
                tracing::info!(backend = %key, "Health prober started");
            }
        }
    }

    /// Stop probing a backend, aborting any in-flight probe, and drop its
    /// status record. Idempotent.
    pub async fn stop(&self, backend: &str) {
        if let Some((_, handle)) = self.probers.remove(backend) {
            handle.abort();
            let _ = handle.await;
            self.statuses.remove(backend);
            tracing::info!(backend = %backend, "Health prober stopped");
        }
    }

    /// Stop every prober, in parallel.
    pub async fn stop_all(&self) {
        let keys: Vec<String> = self.probers.iter().map(|e| e.key().clone()).collect();
        let mut handles = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some((_, handle)) = self.probers.remove(&key) {
                handle.abort();
                handles.push(handle);
            }
        }
        futures_util::future::join_all(handles).await;
        self.statuses.clear();
        tracing::info!("All health probers stopped");
    }

    /// Force-flip a backend to unhealthy from the request path.
    pub fn mark_unhealthy(&self, backend: &str, reason: &str) {
        let mut status = self
            .statuses
            .entry(backend.to_string())
            .or_insert_with(BackendHealth::new);
        if status.force_unhealthy(reason.to_string()) {
            tracing::warn!(backend = %backend, reason = %reason, "Backend marked unhealthy from request path");
        }
        metrics::record_backend_health(backend, false);
    }

    /// Current verdict for a backend. Unobserved backends are healthy.
    pub fn is_healthy(&self, backend: &str) -> bool {
        self.statuses
            .get(backend)
            .map(|status| status.healthy)
            .unwrap_or(true)
    }

    /// Backends currently under active probing.
    pub fn probed(&self) -> Vec<String> {
        self.probers.iter().map(|e| e.key().clone()).collect()
    }

    /// Point-in-time copy of every status record.
    pub fn snapshot(&self) -> Vec<(String, BackendHealth)> {
        self.statuses
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }
}

struct Prober {
    backend: Url,
    key: String,
    config: HealthCheckConfig,
    client: reqwest::Client,
    statuses: Arc<DashMap<String, BackendHealth>>,
}

impl Prober {
    async fn run(self) {
        let interval = Duration::from_secs(self.config.interval_secs);
        loop {
            self.probe_once().await;
            tokio::time::sleep(jittered(interval)).await;
        }
    }

    async fn probe_once(&self) {
        let outcome = self.probe().await;
        let mut status = self
            .statuses
            .entry(self.key.clone())
            .or_insert_with(BackendHealth::new);

        match outcome {
            Ok(response_time_ms) => {
                if status.record_success(response_time_ms) {
                    tracing::info!(
                        backend = %self.key,
                        response_time_ms,
                        "Backend recovered"
                    );
                }
                metrics::record_backend_health(&self.key, true);
            }
            Err(error) => {
                tracing::debug!(backend = %self.key, error = %error, "Health probe failed");
                if status.record_failure(error, self.config.unhealthy_threshold) {
                    tracing::warn!(
                        backend = %self.key,
                        consecutive_failures = status.consecutive_failures,
                        "Backend marked unhealthy"
                    );
                }
                metrics::record_backend_health(&self.key, status.healthy);
            }
        }
    }

    /// Two-legged probe. Returns the first leg's response time on success.
    async fn probe(&self) -> Result<u64, String> {
        let started = Instant::now();

        let first_error = match self.health_url() {
            Ok(url) => match self.client.get(url).send().await {
                Ok(response) if response.status().as_u16() < 500 => {
                    return Ok(started.elapsed().as_millis() as u64);
                }
                Ok(response) => format!("health endpoint returned {}", response.status()),
                Err(e) => describe_probe_error(&e),
            },
            Err(e) => format!("invalid health url: {e}"),
        };

        // Fallback leg: a bare HEAD to the backend root.
        match self.client.head(self.backend.clone()).send().await {
            Ok(response) if response.status().as_u16() < 500 => {
                Ok(started.elapsed().as_millis() as u64)
            }
            Ok(response) => Err(format!(
                "{first_error}; fallback returned {}",
                response.status()
            )),
            Err(e) => Err(format!("{first_error}; fallback: {}", describe_probe_error(&e))),
        }
    }

    fn health_url(&self) -> Result<Url, url::ParseError> {
        self.backend.join(&self.config.path)
    }
}

fn describe_probe_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "probe timed out".to_string()
    } else if error.is_connect() {
        format!("connection failed: {error}")
    } else {
        error.to_string()
    }
}
