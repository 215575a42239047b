//! Sync engine error types

use capture::CaptureError;
use contracts::SourceId;
use thiserror::Error;

/// Coordinator error
///
/// Everything here except `Config`, `AlreadyStarted` and `Stopped` ends the
/// driving loop.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Configuration rejected at construction
    #[error("invalid capture configuration: {0}")]
    Config(String),

    /// Unexpected actor failure (thread gone, protocol misuse)
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// An entry landed in the wrong slot
    #[error("batch entry {position} belongs to '{actual}', expected '{expected}'")]
    Misaligned {
        position: usize,
        expected: SourceId,
        actual: SourceId,
    },

    /// Batch length differs from the number of sources
    #[error("batch has {actual} entries for {expected} sources")]
    BatchLength { expected: usize, actual: usize },

    /// `start` called twice
    #[error("coordinator already started")]
    AlreadyStarted,

    /// `start` called after `stop`
    #[error("coordinator is stopped")]
    Stopped,

    /// Driving thread could not be created
    #[error("failed to spawn coordinator thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Result alias
pub type Result<T> = std::result::Result<T, SyncError>;
