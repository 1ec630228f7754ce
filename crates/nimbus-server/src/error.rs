//! Error types for the Nimbus server.

use std::path::PathBuf;

/// Server error type.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// IO error.
    #[error("IO error at {path}: {message}")]
    Io { path: PathBuf, message: String },

    /// Nimbus core error.
    #[error("Core error: {0}")]
    Core(#[from] nimbus_core::Error),

    /// Invalid listen address.
    #[error("Invalid address: {0}")]
    Address(String),

    /// Watch error.
    #[error("File watch error: {0}")]
    Watch(String),
}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::new(),
            message: e.to_string(),
        }
    }
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
