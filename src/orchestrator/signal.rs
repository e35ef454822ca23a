use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation handle shared between a batch driver and the
/// public cancel surface. Checked at group barriers; never interrupts an
/// in-flight external call.
#[derive(Clone, Default)]
pub struct SignalHandler {
    cancelled: Arc<AtomicBool>,
}

impl SignalHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
