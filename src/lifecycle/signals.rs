//! OS signal handling.
//!
//! SIGINT and SIGTERM both mean graceful shutdown; SIGHUP means reload the
//! route table and reconcile health probers without touching listeners.

/// Events a signal translates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Shutdown,
    Reload,
}

#[cfg(unix)]
pub struct Signals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    hangup: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    pub fn new() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            hangup: signal(SignalKind::hangup())?,
        })
    }

    /// Wait for the next lifecycle-relevant signal.
    pub async fn recv(&mut self) -> LifecycleEvent {
        tokio::select! {
            _ = self.interrupt.recv() => LifecycleEvent::Shutdown,
            _ = self.terminate.recv() => LifecycleEvent::Shutdown,
            _ = self.hangup.recv() => LifecycleEvent::Reload,
        }
    }
}

#[cfg(not(unix))]
pub struct Signals;

#[cfg(not(unix))]
impl Signals {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self)
    }

    /// Without unix signals only Ctrl+C is observable; there is no reload.
    pub async fn recv(&mut self) -> LifecycleEvent {
        let _ = tokio::signal::ctrl_c().await;
        LifecycleEvent::Shutdown
    }
}
