//! Capture session module.

mod session;
mod stats;

pub use session::{CaptureSession, SessionConfig};
pub use stats::RunStats;
