use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cancellable token shared between a store and its background GC loop.
///
/// `dispose(run_gc)` checks [`GcToken::is_cancelled`] before deleting
/// anything; `cancel()` is cooperative — it does not interrupt an
/// already-running delete, only prevents the GC pass from starting or
/// continuing between entries.
#[derive(Clone)]
pub struct GcToken {
    cancelled: Arc<AtomicBool>,
}

impl GcToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Signal "do not perform GC" — called before shutdown.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Default for GcToken {
    fn default() -> Self {
        Self::new()
    }
}
