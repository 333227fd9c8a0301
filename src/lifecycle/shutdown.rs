//! Shutdown coordination for the hub.
//!
//! A single [`Shutdown`] is created at startup and cloned into every
//! component that may end the process: the signal listener, pipes (through
//! [`AsyncErrorReporter`]) and the server. The first trigger wins; later ones
//! are ignored.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;

/// Lifecycle state of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    /// Accepting and serving requests.
    Running,
    /// Triggered; in-flight requests finish, new ones are refused.
    Draining,
    /// All pipes have been closed (or abandoned).
    Closed,
}

/// Why shutdown was triggered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// An OS termination signal, by name.
    Signal(&'static str),
    /// A pipe reported an error outside the request path.
    AsyncError(String),
    /// The HTTP server stopped on its own.
    ServerExited(String),
    /// Programmatic request (tests, embedding).
    Requested,
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownReason::Signal(name) => write!(f, "received {name}"),
            ShutdownReason::AsyncError(err) => write!(f, "async error: {err}"),
            ShutdownReason::ServerExited(why) => write!(f, "server exited: {why}"),
            ShutdownReason::Requested => f.write_str("shutdown requested"),
        }
    }
}

#[derive(Debug, Clone)]
struct Status {
    state: ShutdownState,
    reason: Option<ShutdownReason>,
    triggered_at: Option<Instant>,
}

/// Coordinator for graceful shutdown.
///
/// Cheap to clone; all clones observe the same state.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<Status>>,
}

impl Shutdown {
    /// Create a new coordinator in the `Running` state.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Status {
            state: ShutdownState::Running,
            reason: None,
            triggered_at: None,
        });
        Self { tx: Arc::new(tx) }
    }

    /// Trigger shutdown. Returns `true` only for the call that moved the
    /// process out of `Running`.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        let mut candidate = Some(reason);
        let won = self.tx.send_if_modified(|status| {
            if status.state != ShutdownState::Running {
                return false;
            }
            status.state = ShutdownState::Draining;
            status.reason = candidate.take();
            status.triggered_at = Some(Instant::now());
            true
        });

        match (won, candidate) {
            (true, _) => {
                tracing::info!(reason = %self.reason().unwrap_or(ShutdownReason::Requested), "Shutdown triggered")
            }
            (false, Some(ignored)) => {
                tracing::debug!(reason = %ignored, "Shutdown already in progress, trigger ignored")
            }
            (false, None) => {}
        }
        won
    }

    /// Record that every pipe has been closed.
    pub fn mark_closed(&self) {
        self.tx.send_if_modified(|status| {
            if status.state == ShutdownState::Closed {
                return false;
            }
            status.state = ShutdownState::Closed;
            if status.triggered_at.is_none() {
                status.triggered_at = Some(Instant::now());
            }
            true
        });
    }

    pub fn state(&self) -> ShutdownState {
        self.tx.borrow().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == ShutdownState::Running
    }

    /// Reason recorded by the winning trigger.
    pub fn reason(&self) -> Option<ShutdownReason> {
        self.tx.borrow().reason.clone()
    }

    /// When the winning trigger happened.
    pub fn triggered_at(&self) -> Option<Instant> {
        self.tx.borrow().triggered_at
    }

    /// Wait until shutdown has been triggered. Completes immediately if it
    /// already was.
    pub async fn wait(&self) -> ShutdownReason {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|status| status.state != ShutdownState::Running).await;
        self.reason().unwrap_or(ShutdownReason::Requested)
    }

    /// Handle for pipes to report out-of-band errors.
    pub fn reporter(&self) -> AsyncErrorReporter {
        AsyncErrorReporter {
            shutdown: self.clone(),
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Lets a running pipe end the process after an unrecoverable error that is
/// not tied to a request.
#[derive(Debug, Clone)]
pub struct AsyncErrorReporter {
    shutdown: Shutdown,
}

impl AsyncErrorReporter {
    /// Log `err` and trigger shutdown.
    pub fn report<E>(&self, err: E)
    where
        E: std::fmt::Display,
    {
        tracing::error!(error = %err, "Async error occurred");
        self.shutdown
            .trigger(ShutdownReason::AsyncError(err.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_first_trigger_wins() {
        let shutdown = Shutdown::new();
        assert!(shutdown.is_running());

        assert!(shutdown.trigger(ShutdownReason::Signal("SIGTERM")));
        assert!(!shutdown.trigger(ShutdownReason::Signal("SIGINT")));
        assert!(!shutdown.clone().trigger(ShutdownReason::Requested));

        assert_eq!(shutdown.state(), ShutdownState::Draining);
        assert_eq!(shutdown.reason(), Some(ShutdownReason::Signal("SIGTERM")));
        assert!(shutdown.triggered_at().is_some());

        shutdown.mark_closed();
        assert_eq!(shutdown.state(), ShutdownState::Closed);
        assert!(!shutdown.trigger(ShutdownReason::Requested));
    }

    #[tokio::test]
    async fn test_async_error_triggers_shutdown() {
        let shutdown = Shutdown::new();
        let waiter = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { shutdown.wait().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        shutdown.reporter().report("upstream token refresh failed");

        let reason = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            reason,
            ShutdownReason::AsyncError("upstream token refresh failed".into())
        );
    }

    #[tokio::test]
    async fn test_wait_after_trigger_is_immediate() {
        let shutdown = Shutdown::new();
        shutdown.trigger(ShutdownReason::Requested);
        let reason = tokio::time::timeout(Duration::from_millis(100), shutdown.wait())
            .await
            .unwrap();
        assert_eq!(reason, ShutdownReason::Requested);
    }
}
