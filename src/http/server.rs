//! Router construction and the request admission pipeline.
//!
//! # Pipeline (public listeners)
//! ```text
//! request
//!   → request ID + tracing layers
//!   → ACME challenge short-circuit (no host check, no rate limit)
//!   → host extraction + syntax validation     → 400 on failure
//!   → per-IP rate limiting                    → 429 on exhaustion
//!   → route lookup                            → 502 when unrouted
//!   → proxy engine
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Extension, Router};
use thiserror::Error;
use tower_http::trace::TraceLayer;

use crate::acme::ChallengeDir;
use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::health::HealthChecker;
use crate::http::proxy::{ProxyEngine, RequestContext};
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::observability::StatsSink;
use crate::resilience::circuit_breaker::BreakerRegistry;
use crate::resilience::timeouts::upstream_client;
use crate::routing::table::TableError;
use crate::routing::RouteTable;
use crate::security::host::{client_ip, extract_host, is_valid_host};
use crate::security::rate_limit::{Decision, RateLimiter};

/// Which public listener a request arrived on; feeds X-Forwarded-Proto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerScheme {
    Http,
    Https,
}

impl ListenerScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListenerScheme::Http => "http",
            ListenerScheme::Https => "https",
        }
    }
}

/// Errors raised while assembling the application state.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to open route table: {0}")]
    Routes(#[from] TableError),

    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Application state injected into handlers.
///
/// Owns every collaborator the request path needs; there are no process
/// globals. The supervisor builds one of these and shares it across the
/// public listeners.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ProxyConfig>,
    pub routes: Arc<RouteTable>,
    pub limiter: Arc<RateLimiter>,
    pub breakers: Arc<BreakerRegistry>,
    pub health: Arc<HealthChecker>,
    pub stats: Arc<StatsSink>,
    pub engine: Arc<ProxyEngine>,
    pub challenges: ChallengeDir,
}

impl AppState {
    pub fn new(config: Arc<ProxyConfig>) -> Result<Self, BuildError> {
        let routes = Arc::new(RouteTable::open(config.paths.routes_file())?);
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit));
        let breakers = Arc::new(BreakerRegistry::new(config.circuit_breaker.clone()));
        let health = Arc::new(HealthChecker::new(config.health_check.clone())?);
        let stats = Arc::new(StatsSink::new());
        let engine = Arc::new(ProxyEngine::new(
            upstream_client(&config.timeouts)?,
            Arc::clone(&breakers),
            Arc::clone(&health),
            Arc::clone(&stats),
            &config.retries,
        ));
        let challenges = ChallengeDir::new(config.paths.acme_challenge_dir());

        Ok(Self {
            config,
            routes,
            limiter,
            breakers,
            health,
            stats,
            engine,
            challenges,
        })
    }

    /// Reconcile running probers with the distinct backends of the route
    /// table: start probers for additions, stop probers for removals.
    pub async fn sync_probers(&self) {
        let desired: std::collections::HashMap<String, url::Url> = self
            .routes
            .backends()
            .into_iter()
            .map(|backend| (backend.to_string(), backend))
            .collect();
        let running = self.health.probed();

        for (key, backend) in &desired {
            if !running.contains(key) {
                self.health.start(backend);
            }
        }
        for key in running {
            if !desired.contains_key(&key) {
                self.health.stop(&key).await;
            }
        }
    }
}

/// Build the router serving a public listener.
pub fn build_router(state: AppState, scheme: ListenerScheme) -> Router {
    Router::new()
        .route("/.well-known/acme-challenge/{*token}", any(acme_handler))
        .fallback(proxy_handler)
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(state, admission))
        .layer(Extension(scheme))
        .layer(propagate_request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(set_request_id_layer())
}

/// Admission pipeline: ACME bypass, host checks, rate limiting.
async fn admission(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    if ChallengeDir::matches(request.uri().path()) {
        return next.run(request).await;
    }

    // HTTP/2 carries the authority in the URI instead of a Host header.
    let host = extract_host(request.headers())
        .or_else(|| request.uri().host().map(|h| h.to_ascii_lowercase()));
    let Some(host) = host else {
        tracing::warn!("Request without usable Host header");
        state.stats.record_failure(None);
        return ProxyError::InvalidHost.into_response();
    };
    if !is_valid_host(&host) {
        tracing::warn!(host = %host, "Rejected malformed host");
        state.stats.record_failure(None);
        return ProxyError::InvalidHost.into_response();
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let client = client_ip(request.headers(), peer);

    if state.limiter.admit(&client) == Decision::Limited {
        tracing::warn!(host = %host, client = %client, "Rate limit exceeded");
        state.stats.record_failure(Some(&host));
        return ProxyError::RateLimited {
            retry_after_secs: state.limiter.retry_after_secs(),
        }
        .into_response();
    }

    let scheme = request
        .extensions()
        .get::<ListenerScheme>()
        .copied()
        .unwrap_or(ListenerScheme::Http);

    request.extensions_mut().insert(RequestContext {
        host,
        client_ip: client,
        scheme: scheme.as_str(),
    });
    next.run(request).await
}

/// Terminal handler: route lookup plus engine dispatch.
async fn proxy_handler(
    State(state): State<AppState>,
    context: Option<Extension<RequestContext>>,
    request: Request,
) -> Response {
    let Some(Extension(ctx)) = context else {
        // Only reachable for ACME-prefixed paths the challenge route did
        // not match (e.g. an empty token); admission skipped them.
        if ChallengeDir::matches(request.uri().path()) {
            return axum::http::StatusCode::NOT_FOUND.into_response();
        }
        tracing::error!(path = %request.uri().path(), "Request reached handler without admission context");
        return ProxyError::Internal.into_response();
    };

    let Some(route) = state.routes.lookup(&ctx.host) else {
        tracing::warn!(host = %ctx.host, "No route for host");
        state.stats.record_failure(Some(&ctx.host));
        return ProxyError::NoRoute {
            host: ctx.host.clone(),
        }
        .into_response();
    };

    tracing::debug!(
        host = %ctx.host,
        backend = %route.backend,
        client = %ctx.client_ip,
        "Forwarding request"
    );
    state.engine.forward(&route, &ctx, request).await
}

/// Challenge fetches bypass everything else in the pipeline.
async fn acme_handler(State(state): State<AppState>, Path(token): Path<String>) -> Response {
    state.challenges.serve(&token).await
}
