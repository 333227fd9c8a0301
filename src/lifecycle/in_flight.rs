//! Tracking of requests that are inside a pipe chain.
//!
//! The HTTP server hands each connection to its own task, so stopping the
//! accept loop says nothing about requests still running. [`InFlight`]
//! counts them, lets shutdown wait until none are left, and can tell the
//! remaining ones to give up once the drain deadline has passed.

use std::sync::Arc;

use tokio::sync::watch;

/// Shared counter of in-flight requests. Cheap to clone.
#[derive(Debug, Clone)]
pub struct InFlight {
    count: Arc<watch::Sender<usize>>,
    abandoned: Arc<watch::Sender<bool>>,
}

impl InFlight {
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        let (abandoned, _) = watch::channel(false);
        Self {
            count: Arc::new(count),
            abandoned: Arc::new(abandoned),
        }
    }

    /// Count one request until the returned guard is dropped.
    pub fn enter(&self) -> InFlightGuard {
        self.count.send_modify(|n| *n += 1);
        InFlightGuard {
            count: Arc::clone(&self.count),
        }
    }

    pub fn count(&self) -> usize {
        *self.count.borrow()
    }

    /// Resolves once no request is in flight.
    pub async fn idle(&self) {
        let mut rx = self.count.subscribe();
        // The sender lives in `self`, so this cannot fail.
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Tell every in-flight request to stop waiting on its chain.
    pub fn abandon(&self) {
        self.abandoned.send_replace(true);
    }

    /// Resolves once [`abandon`](Self::abandon) has been called.
    pub async fn abandoned(&self) {
        let mut rx = self.abandoned.subscribe();
        let _ = rx.wait_for(|abandoned| *abandoned).await;
    }
}

impl Default for InFlight {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps one request counted while alive.
#[derive(Debug)]
pub struct InFlightGuard {
    count: Arc<watch::Sender<usize>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.count.send_modify(|n| *n = n.saturating_sub(1));
    }
}
