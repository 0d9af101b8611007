//! Cooperative cancellation.
//!
//! One token is threaded through the long-running loops (BLS aggregate
//! verification, EVM replay). Components observe it at step boundaries and
//! return a distinguished `cancelled` outcome; since verification has no
//! side effects, partial state is impossible.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent; observable from all clones.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
