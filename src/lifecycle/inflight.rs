//! In-flight request tracking and forced abort.
//!
//! # Responsibilities
//! - Count requests currently inside the dispatcher
//! - Let shutdown cut off whatever is still forwarding after the grace period

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

/// Tracks active requests for graceful shutdown.
#[derive(Debug, Clone)]
pub struct InFlightTracker {
    active_count: Arc<AtomicU64>,
    abort_tx: Arc<watch::Sender<bool>>,
    abort_rx: watch::Receiver<bool>,
}

impl InFlightTracker {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            active_count: Arc::new(AtomicU64::new(0)),
            abort_tx: Arc::new(tx),
            abort_rx: rx,
        }
    }

    /// Record a new request. Returns a guard that decrements on drop.
    pub fn track(&self) -> InFlightGuard {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            active_count: Arc::clone(&self.active_count),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Signal every tracked request to stop.
    pub fn abort_all(&self) {
        self.abort_tx.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.abort_rx.borrow()
    }

    /// Resolve once [`abort_all`](Self::abort_all) has been called.
    pub async fn aborted(&self) {
        let mut rx = self.abort_rx.clone();
        if rx.wait_for(|aborted| *aborted).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl Default for InFlightTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight count when dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    active_count: Arc<AtomicU64>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
    }
}
