//! Error types for the sync engine.

use attsync_core::{ConfigError, CoreError, ErrorKind};
use attsync_device::ProtocolError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type for sink writes.
pub type SinkResult<T> = Result<T, SinkError>;

/// Errors that end a source's cycle early.
///
/// None of these is fatal to the process: the orchestrator logs the error,
/// leaves the source's checkpoint where it was and moves on to the next
/// source.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The source store, file or socket could not be reached.
    #[error("connection error: {0}")]
    Connection(String),

    /// Device protocol failure.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The source answered but its content is unusable.
    #[error("source {source_id}: {message}")]
    Source {
        /// Source id.
        source_id: String,
        /// What went wrong.
        message: String,
    },

    /// The sink did not commit a batch.
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// Checkpoint could not be read or written.
    #[error("checkpoint error: {0}")]
    Checkpoint(CoreError),

    /// Another process is running a cycle for this source.
    #[error("source {0} is busy")]
    Busy(String),

    /// Invalid settings.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl From<CoreError> for SyncError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::SourceLocked(id) => SyncError::Busy(id),
            CoreError::Config(e) => SyncError::Config(e),
            other => SyncError::Checkpoint(other),
        }
    }
}

impl SyncError {
    /// Creates a source error.
    pub fn source(source_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Source {
            source_id: source_id.into(),
            message: message.into(),
        }
    }

    /// Returns true if the next tick may succeed without intervention.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Connection(_) | SyncError::Busy(_) => true,
            SyncError::Protocol(e) => e.is_retryable(),
            SyncError::Sink(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Returns the error category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Connection(_) | SyncError::Busy(_) => ErrorKind::Connection,
            SyncError::Source { .. } => ErrorKind::Connection,
            SyncError::Protocol(e) => e.kind(),
            SyncError::Sink(_) => ErrorKind::Sink,
            SyncError::Checkpoint(e) => e.kind(),
            SyncError::Config(_) => ErrorKind::Config,
        }
    }
}

/// Errors from a [`BatchSink`](crate::BatchSink) write.
#[derive(Error, Debug, Clone)]
pub enum SinkError {
    /// The database could not be reached.
    #[error("sink unreachable: {0}")]
    Unreachable(String),

    /// The statement failed.
    #[error("sink query failed: {0}")]
    Query(String),

    /// Credentials could not be obtained.
    #[error("sink credentials unavailable: {0}")]
    Credentials(String),

    /// The sink refused the batch.
    #[error("batch rejected: {0}")]
    Rejected(String),
}

impl SinkError {
    /// Returns true if the same batch may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SinkError::Unreachable(_) | SinkError::Rejected(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attsync_device::SessionPhase;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::Connection("db locked".into()).is_retryable());
        assert!(SyncError::Busy("dev".into()).is_retryable());
        assert!(SyncError::from(SinkError::Unreachable("down".into())).is_retryable());
        assert!(!SyncError::from(SinkError::Query("syntax".into())).is_retryable());
        assert!(SyncError::from(ProtocolError::Timeout {
            phase: SessionPhase::Streaming
        })
        .is_retryable());
        assert!(!SyncError::source("alog", "bad").is_retryable());
    }

    #[test]
    fn core_errors_map_to_sync_errors() {
        let busy = SyncError::from(CoreError::SourceLocked("dev".into()));
        assert!(matches!(busy, SyncError::Busy(_)));

        let config = SyncError::from(CoreError::Config(ConfigError::InvalidBatchSize));
        assert_eq!(config.kind(), ErrorKind::Config);

        let corrupt = SyncError::from(CoreError::CorruptCheckpoint {
            source_id: "dev".into(),
            reason: "x".into(),
        });
        assert!(matches!(corrupt, SyncError::Checkpoint(_)));
    }

    #[test]
    fn error_display() {
        let err = SyncError::source("alog", "directory missing");
        assert_eq!(err.to_string(), "source alog: directory missing");
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(SyncError::from(SinkError::Rejected("x".into())).kind(), ErrorKind::Sink);
    }
}
