//! Graceful shutdown.
//!
//! [`Shutdown`] is a cloneable trigger backed by a
//! [`CancellationToken`]; the accept loop, every connection and every
//! in-flight request observe it. [`ConnectionTracker`] counts open
//! connections so the server can drain them after the trigger fires.
//!
//! # Example
//!
//! ```rust
//! use apex_server::Shutdown;
//!
//! let shutdown = Shutdown::new();
//! let handle = shutdown.clone();
//!
//! handle.trigger();
//! assert!(shutdown.is_triggered());
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// A shared shutdown trigger.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    /// Creates an untriggered handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a handle that triggers on SIGTERM or SIGINT (Ctrl+C on
    /// non-Unix platforms).
    ///
    /// Must be called inside a Tokio runtime.
    #[must_use]
    pub fn with_os_signals() -> Self {
        let shutdown = Self::new();
        let handle = shutdown.clone();
        tokio::spawn(async move {
            wait_for_os_signal().await;
            handle.trigger();
        });
        shutdown
    }

    /// Triggers shutdown. Idempotent.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Returns `true` once triggered.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes when shutdown is triggered.
    pub async fn wait(&self) {
        self.token.cancelled().await;
    }

    /// A token cancelled together with this handle, for per-request
    /// signals.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }
}

async fn wait_for_os_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {
                        tracing::info!("Received SIGTERM, initiating graceful shutdown");
                    }
                    _ = sigint.recv() => {
                        tracing::info!("Received SIGINT, initiating graceful shutdown");
                    }
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!("Failed to register signal handlers: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received Ctrl+C, initiating graceful shutdown"),
            Err(e) => {
                tracing::error!("Failed to wait for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Counts open connections.
///
/// ```rust
/// use apex_server::shutdown::ConnectionTracker;
///
/// let tracker = ConnectionTracker::new();
/// let token = tracker.acquire();
/// assert_eq!(tracker.active_connections(), 1);
///
/// drop(token);
/// assert_eq!(tracker.active_connections(), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

impl ConnectionTracker {
    /// Creates a tracker with no connections.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection until the returned token is dropped.
    #[must_use]
    pub fn acquire(&self) -> ConnectionToken {
        self.active.fetch_add(1, Ordering::SeqCst);
        ConnectionToken {
            active: Arc::clone(&self.active),
            notify: Arc::clone(&self.notify),
        }
    }

    /// Number of open connections.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Completes once no connection is open.
    pub async fn wait_idle(&self) {
        loop {
            // Register before checking so a drop in between is not missed.
            let notified = self.notify.notified();
            if self.active.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// An open connection; dropping it releases the slot.
#[derive(Debug)]
pub struct ConnectionToken {
    active: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

impl Drop for ConnectionToken {
    fn drop(&mut self) {
        if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.notify.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_trigger_is_shared_and_idempotent() {
        let shutdown = Shutdown::new();
        let other = shutdown.clone();
        assert!(!other.is_triggered());

        shutdown.trigger();
        shutdown.trigger();
        assert!(other.is_triggered());
    }

    #[tokio::test]
    async fn test_wait_completes_when_triggered() {
        let shutdown = Shutdown::new();
        let handle = shutdown.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            handle.trigger();
        });

        tokio::time::timeout(Duration::from_secs(1), shutdown.wait())
            .await
            .expect("wait should complete");
    }

    #[test]
    fn test_child_token_follows_trigger() {
        let shutdown = Shutdown::new();
        let child = shutdown.child_token();
        shutdown.trigger();
        assert!(child.is_cancelled());
    }

    #[test]
    fn test_tracker_counts() {
        let tracker = ConnectionTracker::new();
        let a = tracker.acquire();
        let b = tracker.acquire();
        assert_eq!(tracker.active_connections(), 2);

        drop(a);
        assert_eq!(tracker.active_connections(), 1);
        drop(b);
        assert_eq!(tracker.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_wait_idle_immediate() {
        let tracker = ConnectionTracker::new();
        tokio::time::timeout(Duration::from_millis(10), tracker.wait_idle())
            .await
            .expect("no connections to wait for");
    }

    #[tokio::test]
    async fn test_wait_idle_after_drop() {
        let tracker = ConnectionTracker::new();
        let token = tracker.acquire();

        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.wait_idle().await })
        };

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            drop(token);
        });

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("wait should complete")
            .expect("task should not panic");
    }
}
