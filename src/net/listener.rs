//! TCP listener with connection backpressure.
//!
//! A semaphore enforces `max_connections`; when the limit is reached new
//! connections wait for a slot instead of piling up unbounded. The permit
//! doubles as the in-flight tracker the supervisor drains during graceful
//! shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind to address.
    Bind(std::io::Error),
    /// Failed to accept connection.
    Accept(std::io::Error),
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
        }
    }
}

impl std::error::Error for ListenerError {}

/// A bounded TCP listener that limits concurrent connections.
pub struct Listener {
    inner: TcpListener,
    local_addr: SocketAddr,
    connection_limit: Arc<Semaphore>,
    max_connections: usize,
}

impl Listener {
    /// Bind to `addr` with a connection limit.
    pub async fn bind(addr: SocketAddr, max_connections: usize) -> Result<Self, ListenerError> {
        let listener = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;
        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(
            address = %local_addr,
            max_connections,
            "Listener bound"
        );

        Ok(Self {
            inner: listener,
            local_addr,
            connection_limit: Arc::new(Semaphore::new(max_connections)),
            max_connections,
        })
    }

    /// Accept a new connection, waiting for a slot when the limit has been
    /// reached. The returned permit must be held for the connection's
    /// lifetime.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        // Acquire the permit first so a full house backpressures the
        // accept queue itself.
        let permit = self
            .connection_limit
            .clone()
            .acquire_owned()
            .await
            .expect("connection semaphore closed");

        let (stream, peer) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        tracing::debug!(
            peer = %peer,
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Ok((stream, peer, ConnectionPermit { _permit: permit }))
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Connections currently in flight.
    pub fn active_connections(&self) -> usize {
        self.max_connections - self.connection_limit.available_permits()
    }

    /// Configured maximum connections.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

/// A slot in the connection limit, released on drop. Dropping on any exit
/// path (including a panicking handler task) keeps the count accurate.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tracks_active_connections() {
        let listener = Listener::bind("127.0.0.1:0".parse().unwrap(), 4)
            .await
            .unwrap();
        let addr = listener.local_addr();
        assert_eq!(listener.active_connections(), 0);

        let _client = TcpStream::connect(addr).await.unwrap();
        let (_stream, _peer, permit) = listener.accept().await.unwrap();
        assert_eq!(listener.active_connections(), 1);

        drop(permit);
        assert_eq!(listener.active_connections(), 0);
    }
}
