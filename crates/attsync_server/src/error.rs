//! Error types for the push receiver.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for receiver operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that stop the receiver or one of its parts.
///
/// Per-request problems (unparsable lines, failed journal appends, failed
/// flushes) are logged and never surface as errors to the device.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The listen address could not be bound.
    #[error("cannot bind {addr}: {source}")]
    Bind {
        /// Address.
        addr: std::net::SocketAddr,
        /// Cause.
        source: std::io::Error,
    },

    /// The journal file could not be opened.
    #[error("cannot open journal {path}: {source}")]
    Journal {
        /// Journal path.
        path: PathBuf,
        /// Cause.
        source: std::io::Error,
    },

    /// I/O error while serving.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Returns true if the error happened before serving started.
    pub fn is_startup_error(&self) -> bool {
        matches!(self, ServerError::Bind { .. } | ServerError::Journal { .. })
    }
}
