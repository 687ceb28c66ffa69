//! Graceful Shutdown Handler
//!
//! Lifecycle of a role's replication services: background loops watch for
//! the stop signal, request handlers register in-flight work, and shutdown
//! waits for that work to drain.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};

/// Shutdown coordinator for a role instance.
///
/// Cheap to clone; every clone observes the same state.
#[derive(Clone)]
pub struct ShutdownController {
    /// `true` once shutdown has been initiated
    signal: Arc<watch::Sender<bool>>,
    /// Requests currently being served
    in_flight: Arc<AtomicUsize>,
    /// Woken when `in_flight` drops to zero
    drained: Arc<Notify>,
}

impl ShutdownController {
    /// Create a new shutdown controller.
    pub fn new() -> Self {
        let (signal, _) = watch::channel(false);
        Self {
            signal: Arc::new(signal),
            in_flight: Arc::new(AtomicUsize::new(0)),
            drained: Arc::new(Notify::new()),
        }
    }

    /// Initiate graceful shutdown. Idempotent.
    pub fn shutdown(&self) {
        let first = self.signal.send_if_modified(|stopped| {
            let changed = !*stopped;
            *stopped = true;
            changed
        });
        if first {
            tracing::info!("initiating graceful shutdown, in_flight={}", self.in_flight());
        }
    }

    /// Check if shutdown has been initiated.
    pub fn is_shutdown(&self) -> bool {
        *self.signal.borrow()
    }

    /// Resolves once shutdown has been initiated, including when it already was.
    pub async fn stopped(&self) {
        let mut rx = self.signal.subscribe();
        // Sender lives in self, so wait_for cannot fail on a closed channel.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    /// Number of in-flight requests.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Register an in-flight request. The count drops when the guard does.
    pub fn track(&self) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            controller: self.clone(),
        }
    }

    fn finished(&self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.drained.notify_waiters();
        }
    }

    /// Wait for in-flight requests to finish, up to `timeout`.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.drained.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.in_flight() == 0 {
                    return;
                }
                notified.await;
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!("drain timeout: {} requests still in flight", self.in_flight());
                false
            }
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for one in-flight request.
pub struct InFlightGuard {
    controller: ShutdownController,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.controller.finished();
    }
}

/// Completes when the process receives Ctrl+C or SIGTERM, then initiates
/// shutdown on `controller`.
pub async fn shutdown_signal(controller: ShutdownController) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, initiating shutdown");
        }
    }

    controller.shutdown();
}
