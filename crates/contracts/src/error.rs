//! Layered error definitions
//!
//! Categorized by source: config / stream / io

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Stream Errors =====
    /// Opening a stream connection failed
    #[error("failed to open stream '{address}': {message}")]
    StreamOpen { address: String, message: String },

    /// Address not understood by the backend
    #[error("unsupported stream address '{address}'")]
    UnsupportedAddress { address: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create stream open error
    pub fn stream_open(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StreamOpen {
            address: address.into(),
            message: message.into(),
        }
    }
}
