//! # Shutdown Signal
//!
//! Cooperative cancellation flag shared between the node driver and the
//! agreement loops. Long iterations check it at the top of every pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Clonable exit-requested flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    requested: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every holder of this signal to unwind.
    pub fn request(&self) {
        if !self.requested.swap(true, Ordering::SeqCst) {
            tracing::info!("Shutdown requested");
        }
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}
