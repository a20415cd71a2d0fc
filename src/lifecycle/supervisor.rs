//! The listener supervisor.
//!
//! Owns the three listeners (public plain, public TLS, internal stats) and
//! the process lifecycle: startup ordering, SIGHUP reloads, and graceful
//! shutdown. Listeners keep their sockets across reloads; in-flight
//! requests always complete through their connection permits.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tokio_rustls::TlsAcceptor;
use tower::ServiceExt;

use crate::config::ProxyConfig;
use crate::http::server::{build_router, AppState, BuildError, ListenerScheme};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::{LifecycleEvent, Signals};
use crate::net::listener::{Listener, ListenerError};
use crate::net::tls::{certs_present, load_server_config, TlsError};
use crate::observability::metrics::init_metrics;
use crate::observability::stats::stats_router;

/// Errors that abort supervisor startup.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("invalid bind address '{addr}'")]
    Addr { addr: String },

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("failed to bind stats listener: {0}")]
    StatsBind(std::io::Error),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("failed to install signal handlers: {0}")]
    Signals(std::io::Error),
}

/// Owns listeners and lifecycle for one proxy process.
pub struct Supervisor {
    config: Arc<ProxyConfig>,
    state: AppState,
    shutdown: Shutdown,
}

impl Supervisor {
    pub fn new(config: ProxyConfig) -> Result<Self, SupervisorError> {
        let config = Arc::new(config);
        let state = AppState::new(Arc::clone(&config))?;
        Ok(Self {
            config,
            state,
            shutdown: Shutdown::new(),
        })
    }

    /// The assembled application state (exposed for the test harness).
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run until a shutdown signal arrives.
    pub async fn run(self) -> Result<(), SupervisorError> {
        // Pin the process-wide TLS provider before any client or listener
        // builds a rustls config.
        let _ = rustls::crypto::ring::default_provider().install_default();

        if self.config.observability.metrics_enabled {
            match self.config.observability.metrics_address.parse() {
                Ok(addr) => init_metrics(addr),
                Err(_) => tracing::error!(
                    address = %self.config.observability.metrics_address,
                    "Failed to parse metrics address"
                ),
            }
        }

        // Public plain listener; must bind or startup fails.
        let http_addr = parse_addr(&self.config.listener.http_address)?;
        let plain = Arc::new(
            Listener::bind(http_addr, self.config.listener.max_connections).await?,
        );
        tokio::spawn(serve_public(
            Arc::clone(&plain),
            build_router(self.state.clone(), ListenerScheme::Http),
            None,
            self.shutdown.subscribe(),
        ));

        // Public TLS listener; optional, gated on certificate material.
        let cert_path = self.config.paths.tls_cert();
        let key_path = self.config.paths.tls_key();
        let tls_listener = if certs_present(&cert_path, &key_path) {
            let tls_config = load_server_config(&cert_path, &key_path)?;
            let https_addr = parse_addr(&self.config.listener.https_address)?;
            let listener = Arc::new(
                Listener::bind(https_addr, self.config.listener.max_connections).await?,
            );
            tokio::spawn(serve_public(
                Arc::clone(&listener),
                build_router(self.state.clone(), ListenerScheme::Https),
                Some(TlsAcceptor::from(tls_config)),
                self.shutdown.subscribe(),
            ));
            Some(listener)
        } else {
            tracing::info!(
                cert = %cert_path.display(),
                key = %key_path.display(),
                "TLS material not found, serving HTTP only"
            );
            None
        };

        // Internal stats listener, loopback only.
        let stats_addr = parse_addr(&self.config.stats.bind_address)?;
        let stats_listener = tokio::net::TcpListener::bind(stats_addr)
            .await
            .map_err(SupervisorError::StatsBind)?;
        tracing::info!(address = %stats_addr, "Stats listener bound");
        let stats_app = stats_router(Arc::clone(&self.state.stats));
        let stats_wait = self.shutdown.wait();
        tokio::spawn(async move {
            if let Err(e) = axum::serve(stats_listener, stats_app)
                .with_graceful_shutdown(stats_wait)
                .await
            {
                tracing::error!(error = %e, "Stats server error");
            }
        });

        // Probers for every backend currently routed.
        self.state.sync_probers().await;

        tracing::info!("rproxy ready");

        // Signal loop: reloads in place, shutdown breaks.
        let mut signals = Signals::new().map_err(SupervisorError::Signals)?;
        loop {
            match signals.recv().await {
                LifecycleEvent::Reload => self.reload().await,
                LifecycleEvent::Shutdown => break,
            }
        }

        tracing::info!("Shutdown signal received");
        self.shutdown.trigger();
        self.state.health.stop_all().await;

        let grace = Duration::from_secs(self.config.timeouts.shutdown_grace_secs);
        drain(&plain, tls_listener.as_deref(), grace).await;

        tracing::info!("Supervisor stopped");
        Ok(())
    }

    /// SIGHUP: re-read routes, reconcile probers. Listener sockets stay.
    async fn reload(&self) {
        tracing::info!("Reload signal received");
        match self.state.routes.reload() {
            Ok(count) => {
                self.state.sync_probers().await;
                tracing::info!(routes = count, "Reload complete");
            }
            Err(e) => {
                tracing::error!(error = %e, "Route reload failed, keeping previous table");
            }
        }
    }
}

fn parse_addr(raw: &str) -> Result<SocketAddr, SupervisorError> {
    raw.parse().map_err(|_| SupervisorError::Addr {
        addr: raw.to_string(),
    })
}

/// Wait for in-flight connections to finish, bounded by the grace period.
async fn drain(plain: &Listener, tls: Option<&Listener>, grace: Duration) {
    let deadline = tokio::time::Instant::now() + grace;
    loop {
        let active = plain.active_connections()
            + tls.map(|l| l.active_connections()).unwrap_or(0);
        if active == 0 {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            tracing::warn!(active, "Grace period elapsed with connections still active");
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Accept loop for a public listener, optionally TLS-terminating.
pub async fn serve_public(
    listener: Arc<Listener>,
    router: Router,
    tls: Option<TlsAcceptor>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let addr = listener.local_addr();
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, peer, permit) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        continue;
                    }
                };
                let router = router.clone();
                let tls = tls.clone();
                tokio::spawn(async move {
                    // Held for the connection lifetime; releases the slot
                    // on every exit path.
                    let _permit = permit;
                    match tls {
                        Some(acceptor) => match acceptor.accept(stream).await {
                            Ok(tls_stream) => serve_connection(tls_stream, peer, router).await,
                            Err(e) => {
                                tracing::debug!(peer = %peer, error = %e, "TLS handshake failed")
                            }
                        },
                        None => serve_connection(stream, peer, router).await,
                    }
                });
            }
        }
    }
    tracing::info!(address = %addr, "Listener stopped accepting");
}

/// Serve one connection with hyper, injecting the peer address so the
/// admission layer can derive the client IP at the edge.
async fn serve_connection<S>(stream: S, peer: SocketAddr, router: Router)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = hyper::service::service_fn(move |mut request: hyper::Request<hyper::body::Incoming>| {
        let router = router.clone();
        request.extensions_mut().insert(ConnectInfo(peer));
        async move { router.oneshot(request.map(Body::new)).await }
    });

    if let Err(e) = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
        .serve_connection_with_upgrades(TokioIo::new(stream), service)
        .await
    {
        tracing::debug!(peer = %peer, error = %e, "Connection error");
    }
}
