//! Error types shared across attsync.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Coarse error category used in log lines and retry decisions.
///
/// Every crate error maps onto one of these through a `kind()` method so
/// that containment decisions (skip the record, abort the session, keep the
/// checkpoint, refuse to start) can be made without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Socket, file or database unreachable. Retried on the next tick.
    Connection,
    /// Device handshake/setup malformed or timed out.
    Protocol,
    /// A single record failed to parse or sanity checks.
    Decode,
    /// The cloud sink rejected or could not receive a batch.
    Sink,
    /// Invalid configuration. Fatal at startup only.
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Decode => "decode",
            ErrorKind::Sink => "sink",
            ErrorKind::Config => "config",
        };
        f.write_str(name)
    }
}

/// Errors raised by the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A persisted checkpoint could not be parsed.
    #[error("corrupt checkpoint for source {source_id}: {reason}")]
    CorruptCheckpoint {
        /// Source whose checkpoint is unreadable.
        source_id: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A source id cannot be used as a file name.
    #[error("invalid source id: {0:?}")]
    InvalidSourceId(String),

    /// Credentials could not be loaded or decrypted.
    #[error("credentials error: {0}")]
    Credentials(String),

    /// A raw record could not be turned into an event.
    #[error("decode error: {0}")]
    Decode(String),

    /// Another process is syncing the same source.
    #[error("source {0} is locked by another process")]
    SourceLocked(String),
}

impl CoreError {
    /// Creates a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Creates a credentials error.
    pub fn credentials(message: impl Into<String>) -> Self {
        Self::Credentials(message.into())
    }

    /// Returns the error category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Io(_) => ErrorKind::Connection,
            CoreError::Config(_) | CoreError::InvalidSourceId(_) => ErrorKind::Config,
            CoreError::CorruptCheckpoint { .. } => ErrorKind::Config,
            CoreError::Credentials(_) => ErrorKind::Sink,
            CoreError::Decode(_) => ErrorKind::Decode,
            CoreError::SourceLocked(_) => ErrorKind::Connection,
        }
    }
}

/// Errors found while loading or validating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// The configuration file is not valid TOML or has wrong types.
    #[error("cannot parse configuration: {0}")]
    Parse(String),

    /// A source id is empty or not usable as a file name.
    #[error("invalid source id {0:?}")]
    InvalidSourceId(String),

    /// Two sources share an id, so they would share a checkpoint.
    #[error("duplicate source id {0:?}")]
    DuplicateSource(String),

    /// Batch size must be at least one.
    #[error("batch size must be greater than zero")]
    InvalidBatchSize,

    /// Schedule cannot produce ticks.
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    /// A device record layout is inconsistent.
    #[error("invalid record layout for {source_id}: {reason}")]
    InvalidLayout {
        /// Source that carries the layout.
        source_id: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A timeout or interval is out of range.
    #[error("invalid timing for {source_id}: {reason}")]
    InvalidTiming {
        /// Source or section that carries the value.
        source_id: String,
        /// What is wrong with it.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds() {
        assert_eq!(CoreError::decode("bad").kind(), ErrorKind::Decode);
        assert_eq!(
            CoreError::Config(ConfigError::InvalidBatchSize).kind(),
            ErrorKind::Config
        );
        assert_eq!(
            CoreError::Io(io::Error::new(io::ErrorKind::NotFound, "gone")).kind(),
            ErrorKind::Connection
        );
    }

    #[test]
    fn error_display() {
        let err = CoreError::CorruptCheckpoint {
            source_id: "access-db".into(),
            reason: "bad time".into(),
        };
        assert!(err.to_string().contains("access-db"));
        assert_eq!(ErrorKind::Sink.to_string(), "sink");
    }
}
