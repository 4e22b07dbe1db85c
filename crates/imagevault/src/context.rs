//! Cancellation and deadline tracking for in-flight calls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::StoreError;

/// Tracks cancellation and an optional deadline for one RPC invocation.
///
/// Handlers consult the context before every stream receive; the store's
/// send loop re-checks it between every file read and every chunk emit.
/// Clones share the cancellation flag, so a handler can hand one clone to
/// the store and trip the other when the transport reports the peer gone.
#[derive(Clone, Debug, Default)]
pub struct CallContext {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CallContext {
    /// Context with no deadline and not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Context that expires at the given instant.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancelled: Arc::default(),
            deadline: Some(deadline),
        }
    }

    /// Flag the call as cancelled; every later [`check`](Self::check) fails.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether the call has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Returns the error matching the context state, if any.
    ///
    /// Cancellation wins over an expired deadline when both hold.
    pub fn check(&self) -> Result<(), StoreError> {
        if self.is_cancelled() {
            return Err(StoreError::Canceled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(StoreError::DeadlineExceeded);
            }
        }
        Ok(())
    }
}
