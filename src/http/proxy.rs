//! The forwarding engine.
//!
//! One call to [`ProxyEngine::forward`] owns the whole upstream exchange:
//! target URL reconstruction, header rewrite, breaker admission, the retry
//! loop with exponential backoff, health marking, and counter updates.
//!
//! # Design Decisions
//! - 5xx responses count as failures (breaker, health, stats) but the
//!   final attempt's body still reaches the client
//! - A request body streams at most once; once an attempt has consumed it,
//!   a failure is terminal (bodies are never buffered for replay)
//! - Client disconnects drop this future mid-await, which the breaker's
//!   cancellation guard records as a failure

use std::sync::Arc;

use axum::body::Body;
use axum::http::{request::Parts, HeaderMap, Method};
use axum::response::{IntoResponse, Response};
use url::Url;

use crate::config::RetryConfig;
use crate::error::ProxyError;
use crate::health::HealthChecker;
use crate::observability::{metrics, StatsSink};
use crate::resilience::circuit_breaker::{BreakerError, BreakerRegistry};
use crate::resilience::retries::{FailureKind, RetrySchedule};
use crate::routing::Route;
use crate::security::headers::{apply_security_headers, strip_hop_by_hop, upstream_headers};

/// Per-request context derived by the admission layer.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Validated, lowercased host the client asked for.
    pub host: String,
    /// Derived client IP, used for X-Forwarded-For / X-Real-IP.
    pub client_ip: String,
    /// Scheme the client connected over ("http" or "https").
    pub scheme: &'static str,
}

/// Forwards requests to backends with breaker admission and retries.
pub struct ProxyEngine {
    client: reqwest::Client,
    breakers: Arc<BreakerRegistry>,
    health: Arc<HealthChecker>,
    stats: Arc<StatsSink>,
    schedule: RetrySchedule,
}

/// The request body, stream-once.
enum BodySlot {
    /// No body to send; every attempt may retry.
    Empty,
    /// A body stream; `None` once an attempt has taken it.
    Stream(Option<Body>),
}

impl BodySlot {
    fn consumed(&self) -> bool {
        matches!(self, BodySlot::Stream(None))
    }
}

/// Why one upstream attempt failed.
enum AttemptError {
    /// Breaker rejected before the operation ran; body untouched.
    Rejected,
    /// Backend answered 5xx; the response is kept for passthrough.
    Status(reqwest::Response),
    /// Timeout or transport error.
    Transport(reqwest::Error),
    /// The body was consumed by an earlier attempt.
    BodyUnavailable,
}

impl AttemptError {
    fn kind(&self) -> FailureKind {
        match self {
            AttemptError::Rejected => FailureKind::BreakerOpen,
            AttemptError::Status(_) => FailureKind::UpstreamStatus,
            AttemptError::Transport(e) if e.is_timeout() => FailureKind::Timeout,
            AttemptError::Transport(_) | AttemptError::BodyUnavailable => FailureKind::Network,
        }
    }

    fn describe(&self) -> String {
        match self {
            AttemptError::Rejected => "circuit breaker open".to_string(),
            AttemptError::Status(response) => format!("upstream returned {}", response.status()),
            AttemptError::Transport(e) if e.is_timeout() => "upstream timed out".to_string(),
            AttemptError::Transport(e) => format!("upstream error: {e}"),
            AttemptError::BodyUnavailable => "request body already consumed".to_string(),
        }
    }
}

impl ProxyEngine {
    pub fn new(
        client: reqwest::Client,
        breakers: Arc<BreakerRegistry>,
        health: Arc<HealthChecker>,
        stats: Arc<StatsSink>,
        retries: &RetryConfig,
    ) -> Self {
        Self {
            client,
            breakers,
            health,
            stats,
            schedule: RetrySchedule::new(retries),
        }
    }

    /// Forward a request to the route's backend and stream the response
    /// back. Never returns an error: every failure mode maps to a client
    /// response here.
    pub async fn forward(
        &self,
        route: &Route,
        ctx: &RequestContext,
        request: axum::extract::Request,
    ) -> Response {
        let (parts, body) = request.into_parts();
        let target = target_url(&route.backend, &parts);
        let headers = upstream_headers(&parts.headers, &ctx.host, ctx.scheme, &ctx.client_ip);
        let backend_key = route.backend.as_str();
        let breaker = self.breakers.get(backend_key);

        let mut body_slot = if has_request_body(&parts.headers) {
            BodySlot::Stream(Some(body))
        } else {
            BodySlot::Empty
        };

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let outcome = breaker
                .execute(|| self.send_attempt(&parts.method, &target, &headers, &mut body_slot))
                .await;

            let cause = match outcome {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if attempt > 1 {
                        tracing::info!(
                            host = %ctx.host,
                            backend = %backend_key,
                            attempt,
                            "Upstream succeeded after retry"
                        );
                    }
                    self.stats.record_success(&ctx.host);
                    metrics::record_request(&ctx.host, status);
                    return client_response(response);
                }
                Err(BreakerError::Open) => AttemptError::Rejected,
                Err(BreakerError::Inner(inner)) => inner,
            };

            let kind = cause.kind();
            self.health.mark_unhealthy(backend_key, &cause.describe());

            let retryable = kind.is_retryable() && !body_slot.consumed();
            let next_delay = self.schedule.delay_before(attempt + 1);

            match next_delay {
                Some(delay) if retryable => {
                    tracing::warn!(
                        host = %ctx.host,
                        backend = %backend_key,
                        attempt,
                        cause = kind.as_str(),
                        retry_in_ms = delay.as_millis() as u64,
                        "Upstream attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                _ => {
                    tracing::error!(
                        host = %ctx.host,
                        backend = %backend_key,
                        attempts = attempt,
                        cause = kind.as_str(),
                        error = %cause.describe(),
                        "Upstream request failed"
                    );
                    self.stats.record_failure(Some(&ctx.host));

                    // A final-attempt 5xx passes through; everything else
                    // becomes a plain 502.
                    return match cause {
                        AttemptError::Status(response) => {
                            metrics::record_request(&ctx.host, response.status().as_u16());
                            client_response(response)
                        }
                        other => {
                            metrics::record_request(&ctx.host, 502);
                            ProxyError::Upstream {
                                reason: other.describe(),
                            }
                            .into_response()
                        }
                    };
                }
            }
        }
    }

    async fn send_attempt(
        &self,
        method: &Method,
        target: &Url,
        headers: &HeaderMap,
        body_slot: &mut BodySlot,
    ) -> Result<reqwest::Response, AttemptError> {
        let mut request = self
            .client
            .request(method.clone(), target.clone())
            .headers(headers.clone());

        if let BodySlot::Stream(slot) = body_slot {
            match slot.take() {
                Some(body) => {
                    request = request.body(reqwest::Body::wrap_stream(body.into_data_stream()));
                }
                None => return Err(AttemptError::BodyUnavailable),
            }
        }

        match request.send().await {
            Ok(response) if response.status().as_u16() >= 500 => {
                Err(AttemptError::Status(response))
            }
            Ok(response) => Ok(response),
            Err(e) => Err(AttemptError::Transport(e)),
        }
    }
}

/// Join the backend origin with the incoming path and query.
fn target_url(backend: &Url, parts: &Parts) -> Url {
    let mut url = backend.clone();
    url.set_path(parts.uri.path());
    url.set_query(parts.uri.query());
    url
}

/// Whether the incoming request carries a body worth streaming.
fn has_request_body(headers: &HeaderMap) -> bool {
    if headers.contains_key(axum::http::header::TRANSFER_ENCODING) {
        return true;
    }
    headers
        .get(axum::http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .map(|len| len > 0)
        .unwrap_or(false)
}

/// Turn an upstream response into the client response: strip hop-by-hop
/// headers, attach the security header set, stream the body through.
fn client_response(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    strip_hop_by_hop(&mut headers);
    apply_security_headers(&mut headers);

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
