//! # Capture
//!
//! Per-source capture actors.
//!
//! Responsibilities:
//! - Own one stream connection per source on a dedicated thread
//! - Keep advancing the stream, materialize a frame on request
//! - Count consecutive failures and reconnect on a cooldown schedule
//! - Provide `MockBackend` and `SyntheticBackend` stream collaborators
//!
//! ## Usage Example
//!
//! ```ignore
//! use capture::{ActorSettings, SourceActor, SyntheticBackend};
//!
//! let mut actor = SourceActor::spawn(
//!     "front".into(),
//!     "synthetic://front?fps=25",
//!     Arc::new(SyntheticBackend::new()),
//!     ActorSettings::from_config(&config),
//!     sink,
//! )?;
//!
//! actor.request_frame();
//! let record = actor.take_result(Duration::from_millis(90))?;
//! ```

mod actor;
mod error;
mod mock;
mod policy;
mod synthetic;

// Re-exports
pub use actor::{ActorSettings, SourceActor};
pub use error::{CaptureError, Result};
pub use mock::{MockBackend, MockControl};
pub use policy::ReconnectPolicy;
pub use synthetic::{SyntheticBackend, SyntheticSpec};
