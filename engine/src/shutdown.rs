//! Cooperative shutdown
//!
//! [`Shutdown`] is a cloneable handle shared by every long wait in the
//! engine. Waits select on [`Shutdown::cancelled`] so an interrupt ends a run
//! promptly instead of blocking for the full response budget.

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Cloneable shutdown signal backed by a watch channel
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: std::sync::Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: std::sync::Arc::new(tx),
            rx,
        }
    }

    /// Request shutdown. Every pending and future `cancelled()` resolves.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been requested
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // An Err means every sender is gone, which can only happen at teardown
        let _ = rx.wait_for(|triggered| *triggered).await;
    }

    /// Spawn a task that triggers shutdown on ctrl-c or SIGTERM
    pub fn listen_for_signals(&self) -> JoinHandle<()> {
        let shutdown = self.clone();

        tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        tracing::warn!("Failed to listen for ctrl-c: {}", e);
                        return;
                    }
                    tracing::info!("Received interrupt signal");
                }
                _ = terminate() => {
                    tracing::info!("Received SIGTERM signal");
                }
            }
            shutdown.trigger();
        })
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::warn!("Failed to create SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
