//! Structured error types for spyglass
//!
//! Using thiserror for automatic Display implementation and error chaining.

use super::types::SessionId;
use spyglass_wire::WireError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session identifier mismatch: expected {expected}, peer presented {actual}")]
    HandshakeMismatch { expected: SessionId, actual: SessionId },

    #[error("Handshake attempted on a session that is not unauthenticated")]
    HandshakeRepeated,

    #[error("Protocol desynchronized at tag 0x{0:02x}; stream abandoned")]
    ProtocolDesync(u8),

    #[error("Storage collaborator failed: {0}")]
    Storage(anyhow::Error),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// True for failures that mean "wrong target" rather than "target went
    /// away" — callers use this to decide whether reconnecting is worthwhile.
    #[must_use]
    pub fn is_handshake_mismatch(&self) -> bool {
        matches!(self, SessionError::HandshakeMismatch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_mismatch_display() {
        let err = SessionError::HandshakeMismatch {
            expected: SessionId([0u8; 16]),
            actual: SessionId([0xff; 16]),
        };
        let msg = err.to_string();
        assert!(msg.contains("00000000000000000000000000000000"));
        assert!(msg.contains("ffffffffffffffffffffffffffffffff"));
        assert!(err.is_handshake_mismatch());
    }

    #[test]
    fn test_desync_display_shows_tag() {
        let err = SessionError::ProtocolDesync(0xEE);
        assert!(err.to_string().contains("0xee"));
        assert!(!err.is_handshake_mismatch());
    }
}
