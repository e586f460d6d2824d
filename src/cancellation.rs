//! # Cancellation
//!
//! Cooperative cancellation shared between callers, the dispatcher and handlers.
//! Cancelling never interrupts a running handler; it stops new ones from starting
//! and lets handlers that watch the signal bail out early.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

/// Clone-able cancellation flag. All clones observe the same state.
#[derive(Clone)]
pub struct CancellationSignal {
    sender: Arc<watch::Sender<bool>>,
}

impl CancellationSignal {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Signal for dispatches that are never cancelled by the caller.
    pub fn never() -> Self {
        Self::new()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        loop {
            if *receiver.borrow_and_update() {
                return;
            }
            // The sender lives as long as `self`, so this only fails if it was dropped.
            if receiver.changed().await.is_err() {
                futures::future::pending::<()>().await;
            }
        }
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationSignal")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
