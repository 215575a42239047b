//! Lifecycle - Running -> StopRequested -> Stopped
//!
//! Shared between a worker thread and whoever owns it. Stop requests are
//! observed cooperatively at the top of the worker loop.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Worker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Running,
    StopRequested,
    Stopped,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::StopRequested,
            _ => Self::Stopped,
        }
    }
}

/// Cheap-to-clone handle on a worker's state.
#[derive(Debug, Clone, Default)]
pub struct Lifecycle(Arc<AtomicU8>);

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Ask the worker to stop. Idempotent, never blocks, and a no-op once stopped.
    pub fn request_stop(&self) {
        let _ = self.0.compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.state() != LifecycleState::Running
    }

    /// Called by the worker on exit.
    pub fn mark_stopped(&self) {
        self.0.store(2, Ordering::Release);
    }
}
