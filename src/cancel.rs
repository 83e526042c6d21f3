use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Polled between retry attempts. An in-flight exchange is never interrupted.
pub trait StopSignal: Send + Sync {
    fn stop_requested(&self) -> bool;
}

/// Shared stop flag. Clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct StopFlag {
    requested: Arc<AtomicBool>,
}

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.requested.store(false, Ordering::SeqCst);
    }
}

impl StopSignal for StopFlag {
    fn stop_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}
