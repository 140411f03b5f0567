//! Error types for device sessions.

use crate::session::SessionPhase;
use attsync_core::ErrorKind;
use std::io;
use thiserror::Error;

/// Result type for device protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that abort a device session.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The device could not be reached.
    #[error("cannot connect to {addr}: {source}")]
    Connection {
        /// Address that was tried.
        addr: String,
        /// Underlying error.
        source: io::Error,
    },

    /// No reply within the phase deadline.
    #[error("timed out during {phase}")]
    Timeout {
        /// Phase that timed out.
        phase: SessionPhase,
    },

    /// The device closed the connection instead of replying.
    #[error("device closed the connection during {phase}")]
    EmptyReply {
        /// Phase that got no reply.
        phase: SessionPhase,
    },

    /// A step was attempted in the wrong phase.
    #[error("cannot {step} while {phase}")]
    OutOfOrder {
        /// Attempted step.
        step: &'static str,
        /// Current phase.
        phase: SessionPhase,
    },

    /// The reply does not fit the protocol.
    #[error("malformed reply: {0}")]
    Malformed(String),

    /// I/O error on an open socket.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ProtocolError {
    /// Returns true if the next tick may succeed without intervention.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProtocolError::Connection { .. } => true,
            ProtocolError::Timeout { .. } => true,
            ProtocolError::EmptyReply { .. } => true,
            ProtocolError::Io(_) => true,
            ProtocolError::OutOfOrder { .. } | ProtocolError::Malformed(_) => false,
        }
    }

    /// Returns the error category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProtocolError::Connection { .. } | ProtocolError::Io(_) => ErrorKind::Connection,
            _ => ErrorKind::Protocol,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let timeout = ProtocolError::Timeout {
            phase: SessionPhase::Handshaking,
        };
        assert!(timeout.is_retryable());
        assert_eq!(timeout.kind(), ErrorKind::Protocol);
        assert!(timeout.to_string().contains("handshaking"));

        let refused = ProtocolError::Connection {
            addr: "10.0.0.1:5005".into(),
            source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert_eq!(refused.kind(), ErrorKind::Connection);
        assert!(!ProtocolError::Malformed("x".into()).is_retryable());
    }
}
