//! Cooperative cancellation for summarisation runs.
//!
//! The pipeline checks a [`CancellationToken`] at stage and chunk boundaries
//! only. A model call that is already in flight is never interrupted (the
//! backend offers no cancellation channel); its result is discarded instead.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Clone-shared cancellation flag.
///
/// # Example
///
/// ```
/// use edgequake_summarize::CancellationToken;
///
/// let token = CancellationToken::new();
/// let driver_token = token.clone();
///
/// token.cancel();
/// assert!(driver_token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token in the non-cancelled state.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. Idempotent; every clone observes it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
