//! Error types for CLI operations.

use std::path::PathBuf;

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {}", path.display())]
    ConfigNotFound { path: PathBuf },

    /// Neither addresses nor a configuration file were given
    #[error("No sources: pass addresses or --config")]
    NoSources,

    /// Coordinator construction or start failed
    #[error("Capture setup failed: {0}")]
    Capture(#[from] sync_engine::SyncError),

    /// The coordinator gave up on its own
    #[error("Capture aborted: {message}")]
    Fatal { message: String },

    /// The capture task could not be joined
    #[error("Error during shutdown: {message}")]
    Shutdown { message: String },
}

impl CliError {
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }
}
