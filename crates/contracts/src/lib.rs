//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the workspace.
//! Business crates depend only on this crate, never on each other's internals.
//!
//! ## Time Model
//! - Cadence is wall-clock based (`std::time::Instant`)
//! - `Batch::sequence` counts coordinator cycles, gaps mean dropped batches

mod config;
mod error;
mod frame;
mod lifecycle;
mod report;
mod source_id;
mod stream;

pub use config::*;
pub use error::*;
pub use frame::*;
pub use lifecycle::{Lifecycle, LifecycleState};
pub use report::*;
pub use source_id::SourceId;
pub use stream::{StreamBackend, StreamConnection};
