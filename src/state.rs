//! The shared run flag coordinating the supervisor and the control endpoint.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Handle to the process-wide "keep streaming" flag.
///
/// Starts active and can be cleared exactly once; there is no way to set it
/// back. Clones share the same flag.
#[derive(Debug, Clone)]
pub struct RunState {
    active: Arc<AtomicBool>,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    pub fn new() -> Self {
        Self {
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Clear the flag. Returns `true` only for the call that flipped it.
    pub fn request_stop(&self) -> bool {
        self.active
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
