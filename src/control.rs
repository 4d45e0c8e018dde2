use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Flag that allows another thread to interrupt frame production.
///
/// Providers poll it at every frame or packet boundary. Clones share the same flag.
#[derive(Clone, Debug, Default)]
pub struct Interrupt {
    raised: Arc<AtomicBool>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests that the current `provide_frames` call returns at the next boundary.
    pub fn raise(&self) {
        self.raised.store(true, Ordering::Release);
    }

    /// Re-arms the flag, typically after the seek or stop it signalled was handled.
    pub fn clear(&self) {
        self.raised.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }
}
