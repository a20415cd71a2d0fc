//! Per-IP fixed-window rate limiting with bounded memory.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::observability::metrics;

/// Admission decision for a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Ok,
    Limited,
}

#[derive(Debug, Clone, Copy)]
struct CounterEntry {
    count: u32,
    reset_at: Instant,
    touched_at: Instant,
}

/// Fixed-window counter table, least-recently-touched eviction past capacity.
///
/// `admit` is non-blocking and never suspends; a single mutex around the
/// table keeps the read-then-increment atomic per client. The counter for
/// a client never exceeds `max_requests + 1`: the increment that trips the
/// limit is the one that returns `Limited`.
pub struct RateLimiter {
    entries: Mutex<HashMap<String, CounterEntry>>,
    window: Duration,
    max_requests: u32,
    capacity: usize,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            window: Duration::from_secs(config.window_secs),
            max_requests: config.max_requests,
            capacity: config.max_tracked_clients,
        }
    }

    /// Admit or reject one request from `client`.
    pub fn admit(&self, client: &str) -> Decision {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(entry) = entries.get_mut(client) {
            entry.touched_at = now;

            if now >= entry.reset_at {
                // Window rolled over; this request opens the next one.
                entry.count = 1;
                entry.reset_at = now + self.window;
                return Decision::Ok;
            }

            if entry.count <= self.max_requests {
                entry.count += 1;
            }
            return if entry.count > self.max_requests {
                metrics::record_rate_limited();
                Decision::Limited
            } else {
                Decision::Ok
            };
        }

        if entries.len() >= self.capacity {
            evict_least_recently_touched(&mut entries);
        }
        entries.insert(
            client.to_string(),
            CounterEntry {
                count: 1,
                reset_at: now + self.window,
                touched_at: now,
            },
        );
        Decision::Ok
    }

    /// Window length in seconds, surfaced as the Retry-After value.
    pub fn retry_after_secs(&self) -> u64 {
        self.window.as_secs()
    }

    /// Number of tracked clients.
    pub fn tracked_clients(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

fn evict_least_recently_touched(entries: &mut HashMap<String, CounterEntry>) {
    // Linear scan; only runs on insert overflow at full capacity.
    let victim = entries
        .iter()
        .min_by_key(|(_, e)| e.touched_at)
        .map(|(k, _)| k.clone());
    if let Some(victim) = victim {
        entries.remove(&victim);
    }
}
