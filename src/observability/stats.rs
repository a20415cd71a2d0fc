//! Request counters and the internal stats endpoints.
//!
//! The engine increments counters on every outcome; the loopback-only
//! listener serves them as JSON at `/internal/stats`, with a liveness
//! endpoint at `/internal/health`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, SecondsFormat, Utc};
use dashmap::DashMap;
use serde::Serialize;

#[derive(Debug, Clone, Default)]
struct HostCounters {
    requests: u64,
    success: u64,
    failed: u64,
    last_request: Option<DateTime<Utc>>,
}

/// Global and per-host request counters.
pub struct StatsSink {
    started_at: Instant,
    total: AtomicU64,
    success: AtomicU64,
    failed: AtomicU64,
    hosts: DashMap<String, HostCounters>,
}

impl StatsSink {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            total: AtomicU64::new(0),
            success: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            hosts: DashMap::new(),
        }
    }

    /// Record a successfully proxied request for `host`.
    pub fn record_success(&self, host: &str) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.success.fetch_add(1, Ordering::Relaxed);
        let mut entry = self.hosts.entry(host.to_string()).or_default();
        entry.requests += 1;
        entry.success += 1;
        entry.last_request = Some(Utc::now());
    }

    /// Record a failed request. `host` is absent when the failure occurred
    /// before a valid host was known (e.g. a rejected Host header).
    pub fn record_failure(&self, host: Option<&str>) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.failed.fetch_add(1, Ordering::Relaxed);
        if let Some(host) = host {
            let mut entry = self.hosts.entry(host.to_string()).or_default();
            entry.requests += 1;
            entry.failed += 1;
            entry.last_request = Some(Utc::now());
        }
    }

    /// Seconds since the sink (and with it the process) started.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let host_stats = self
            .hosts
            .iter()
            .map(|entry| {
                let counters = entry.value();
                (
                    entry.key().clone(),
                    HostSnapshot {
                        requests: counters.requests,
                        success: counters.success,
                        failed: counters.failed,
                        last_request: counters
                            .last_request
                            .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true)),
                    },
                )
            })
            .collect();

        StatsSnapshot {
            total_requests: self.total.load(Ordering::Relaxed),
            success_requests: self.success.load(Ordering::Relaxed),
            failed_requests: self.failed.load(Ordering::Relaxed),
            host_stats,
        }
    }
}

impl Default for StatsSink {
    fn default() -> Self {
        Self::new()
    }
}

/// Counter snapshot in the wire shape of `/internal/stats`.
#[derive(Debug, Serialize)]
pub struct StatsSnapshot {
    #[serde(rename = "totalRequests")]
    pub total_requests: u64,
    #[serde(rename = "successRequests")]
    pub success_requests: u64,
    #[serde(rename = "failedRequests")]
    pub failed_requests: u64,
    #[serde(rename = "hostStats")]
    pub host_stats: BTreeMap<String, HostSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct HostSnapshot {
    pub requests: u64,
    pub success: u64,
    pub failed: u64,
    #[serde(rename = "lastRequest")]
    pub last_request: Option<String>,
}

/// Build the internal router served on the loopback stats listener.
pub fn stats_router(stats: Arc<StatsSink>) -> Router {
    Router::new()
        .route("/internal/stats", get(stats_handler))
        .route("/internal/health", get(health_handler))
        .with_state(stats)
}

async fn stats_handler(State(stats): State<Arc<StatsSink>>) -> Json<StatsSnapshot> {
    Json(stats.snapshot())
}

async fn health_handler(State(stats): State<Arc<StatsSink>>) -> Json<serde_json::Value> {
    let memory = read_memory();
    Json(serde_json::json!({
        "status": "ok",
        "uptime_seconds": stats.uptime_seconds(),
        "memory": {
            "rss_bytes": memory.rss_bytes,
            "vm_bytes": memory.vm_bytes,
        },
    }))
}

#[derive(Debug, Default)]
struct MemoryUsage {
    rss_bytes: u64,
    vm_bytes: u64,
}

/// Process memory from procfs; zeros on platforms without it.
fn read_memory() -> MemoryUsage {
    let mut usage = MemoryUsage::default();
    if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
        for line in status.lines() {
            if let Some(rest) = line.strip_prefix("VmRSS:") {
                usage.rss_bytes = parse_kb(rest);
            } else if let Some(rest) = line.strip_prefix("VmSize:") {
                usage.vm_bytes = parse_kb(rest);
            }
        }
    }
    usage
}

fn parse_kb(rest: &str) -> u64 {
    rest.trim()
        .trim_end_matches(" kB")
        .trim()
        .parse::<u64>()
        .unwrap_or(0)
        * 1024
}
