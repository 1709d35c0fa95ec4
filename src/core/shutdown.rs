//! Shutdown coordination
//!
//! Turns process signals into a [`CancellationToken`] that the orchestrator,
//! the retention sweeper and worker processes all listen on. A second signal
//! forces an immediate exit.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Exit code used when a second signal forces the process down
pub const FORCED_EXIT_CODE: i32 = 130;

/// Coordinates graceful shutdown across the application
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    signal_count: Arc<AtomicUsize>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    /// Create a coordinator with no signal handlers installed
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            signal_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Token that is cancelled once shutdown is requested
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Trigger shutdown
    pub fn trigger_shutdown(&self) {
        self.token.cancel();
    }

    /// Check if shutdown has been requested
    pub fn is_shutdown_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Number of shutdown signals received so far
    pub fn signals_received(&self) -> usize {
        self.signal_count.load(Ordering::Acquire)
    }

    /// Guard execution of a future with signal-driven shutdown
    ///
    /// Installs the signal handlers, then runs the closure with a token that
    /// is cancelled on the first SIGINT/SIGTERM/SIGHUP/SIGQUIT.
    pub async fn guard<F, Fut, R>(future_fn: F) -> R
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: std::future::Future<Output = R>,
    {
        let coordinator = Self::new();
        coordinator.install_signal_handlers();
        future_fn(coordinator.token()).await
    }

    /// Install signal handlers that feed this coordinator
    pub fn install_signal_handlers(&self) {
        #[cfg(unix)]
        {
            unsafe {
                libc::signal(libc::SIGPIPE, libc::SIG_DFL);
            }

            use tokio::signal::unix::{signal, SignalKind};
            let signals = [
                SignalKind::interrupt(),
                SignalKind::terminate(),
                SignalKind::hangup(),
                SignalKind::quit(),
            ];

            for kind in signals {
                let coordinator = self.clone();
                tokio::spawn(async move {
                    let Ok(mut sig) = signal(kind) else {
                        log::debug!("Could not install handler for {:?}", kind);
                        return;
                    };
                    while sig.recv().await.is_some() {
                        coordinator.on_signal();
                    }
                });
            }
        }

        #[cfg(not(unix))]
        {
            let coordinator = self.clone();
            tokio::spawn(async move {
                while tokio::signal::ctrl_c().await.is_ok() {
                    coordinator.on_signal();
                }
            });
        }
    }

    fn on_signal(&self) {
        let prev = self.signal_count.fetch_add(1, Ordering::AcqRel);
        if prev >= 1 {
            log::warn!("Second shutdown signal received; exiting");
            std::process::exit(FORCED_EXIT_CODE);
        }
        log::info!("Shutdown requested");
        self.token.cancel();
    }
}
