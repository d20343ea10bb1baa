//! Session lifecycle: handshake and alive/dead state
//!
//! Every connection opens with a raw 16-byte session identifier and nothing
//! else is read or written until it checks out. A client that has never seen
//! this target adopts whatever identifier the peer presents and persists it;
//! a client reconnecting with a previously persisted identifier demands an
//! exact match — disagreement means "wrong target", which is fatal and
//! reported distinctly from the target simply going away.
//!
//! The session also owns every [`ThreadContext`](crate::shadow_stack) for its
//! lifetime; contexts die only with the session itself.

use std::io::Read;

use log::{info, warn};
use spyglass_wire::codec::read_session_id;

use crate::domain::{SessionError, SessionId};
use crate::shadow_stack::ThreadArena;
use crate::sink::Sink;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing accepted or produced besides the 16-byte identifier
    Unauthenticated,
    /// Handshake succeeded; all message types flow
    Active,
    /// No further reads or writes; the connection is considered closed
    Terminated,
}

#[derive(Debug)]
pub struct Session {
    state: SessionState,
    id: Option<SessionId>,
    threads: ThreadArena,
}

impl Session {
    /// A cold session with no prior identity: the first handshake fixes it.
    #[must_use]
    pub fn new() -> Self {
        Self { state: SessionState::Unauthenticated, id: None, threads: ThreadArena::new() }
    }

    /// A session reconnecting to a target whose identifier was persisted by
    /// an earlier run. The handshake must present exactly this identifier.
    #[must_use]
    pub fn with_expected_id(id: SessionId) -> Self {
        Self {
            state: SessionState::Unauthenticated,
            id: Some(id),
            threads: ThreadArena::new(),
        }
    }

    /// Run the one handshake this connection gets.
    ///
    /// On adoption the identifier is persisted through the sink as the
    /// `session_id` property so the next run can verify it.
    ///
    /// # Errors
    /// - [`SessionError::HandshakeMismatch`] if the peer's identifier differs
    ///   from the expected one; the session is left `Terminated`
    /// - [`SessionError::HandshakeRepeated`] if called twice
    /// - I/O errors if the preamble never arrives
    pub fn handshake<R: Read, S: Sink>(
        &mut self,
        reader: &mut R,
        sink: &mut S,
    ) -> Result<SessionId, SessionError> {
        if self.state != SessionState::Unauthenticated {
            return Err(SessionError::HandshakeRepeated);
        }

        let actual = SessionId(read_session_id(reader)?);

        match self.id {
            None => {
                info!("Adopted session identifier {actual}");
                if let Err(e) = sink.put_property("session_id", &actual.to_hex()) {
                    // Persistence trouble shouldn't kill a live session
                    warn!("Failed to persist session identifier: {e}");
                }
                self.id = Some(actual);
                self.state = SessionState::Active;
                Ok(actual)
            }
            Some(expected) if expected == actual => {
                info!("Session identifier {actual} verified");
                self.state = SessionState::Active;
                Ok(actual)
            }
            Some(expected) => {
                self.state = SessionState::Terminated;
                Err(SessionError::HandshakeMismatch { expected, actual })
            }
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Mark the session dead. Idempotent; there is no way back.
    pub fn terminate(&mut self) {
        self.state = SessionState::Terminated;
    }

    #[must_use]
    pub fn id(&self) -> Option<SessionId> {
        self.id
    }

    #[must_use]
    pub fn threads(&self) -> &ThreadArena {
        &self.threads
    }

    pub fn threads_mut(&mut self) -> &mut ThreadArena {
        &mut self.threads
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
