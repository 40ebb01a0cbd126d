//! Signal-driven coordinated shutdown.
//!
//! First request: stop every session (send the close signal, never wait)
//! and wake the transport loop so it can unwind while supervisor tasks
//! reap their children. A repeated request is the operator escalating out
//! of a hung shutdown and terminates the process immediately.

use crate::registry::Registry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use ttymux_core::TtyResult;

/// What a shutdown request amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownTier {
    /// First request: sessions stopped, waiters woken.
    Graceful,
    /// Repeated request: the caller should terminate the process.
    Immediate,
}

pub struct ShutdownCoordinator {
    requested: AtomicBool,
    tx: watch::Sender<bool>,
}

impl ShutdownCoordinator {
    pub fn new() -> Arc<Self> {
        let (tx, _) = watch::channel(false);
        Arc::new(Self {
            requested: AtomicBool::new(false),
            tx,
        })
    }

    /// Handle one shutdown request.
    ///
    /// The escalation exit is left to the caller so tests can observe the
    /// tier without the process dying.
    pub async fn request(&self, registry: &Registry) -> ShutdownTier {
        if self.requested.swap(true, Ordering::SeqCst) {
            return ShutdownTier::Immediate;
        }
        info!("shutdown requested, stopping sessions");
        registry.stop_all().await;
        self.tx.send_replace(true);
        ShutdownTier::Graceful
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Park until shutdown has been requested. Completes immediately if it
    /// already has.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as self, so this cannot fail.
        let _ = rx.wait_for(|requested| *requested).await;
    }

    /// Install SIGINT/SIGTERM handling: the first delivery requests a
    /// graceful shutdown, a second one terminates the process.
    pub fn install(self: &Arc<Self>, registry: Arc<Registry>) -> TtyResult<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let coordinator = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = sigint.recv() => {}
                    _ = sigterm.recv() => {}
                }
                match coordinator.request(&registry).await {
                    ShutdownTier::Graceful => {
                        info!("waiting for sessions to exit, repeat signal to force");
                    }
                    ShutdownTier::Immediate => {
                        warn!("forced shutdown");
                        std::process::exit(1);
                    }
                }
            }
        });

        Ok(())
    }
}
