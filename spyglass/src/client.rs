//! Connecting to a target and driving the session loop
//!
//! One [`ProfilerClient`] owns one TCP connection to one instrumented
//! process, plus the dispatcher state behind it. The receive loop is
//! strictly single-threaded and blocking; the surrounding program typically
//! parks it on a dedicated thread and consumes records through a
//! [`ChannelSink`](crate::sink::ChannelSink). Closing the transport (via a
//! [`ShutdownHandle`]) is the only cancellation primitive and unblocks any
//! in-flight read.

use std::io::BufReader;
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use log::{info, warn};
use spyglass_wire::{write_request, Request};

use crate::dispatcher::{Dispatcher, LoopOutcome, SessionStats};
use crate::domain::{SessionError, SessionId};
use crate::session::Session;
use crate::sink::Sink;

/// Default event-stream port targets listen on
pub const DEFAULT_PORT: u16 = 7100;

/// Receive buffer sized to absorb event bursts without back-to-back reads
const RECV_BUFFER_BYTES: usize = 64 * 1024;

/// How long a read may block before the target is considered dead.
///
/// Debug builds get a short leash so a wedged target shows up while you are
/// watching; production attaches ride out longer quiet spells.
#[must_use]
pub fn default_read_timeout() -> Duration {
    if cfg!(debug_assertions) {
        Duration::from_secs(10)
    } else {
        Duration::from_secs(30)
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub read_timeout: Duration,
    pub recv_buffer: usize,
    /// Identifier persisted by a previous session, if reconnecting
    pub expected_session_id: Option<SessionId>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            read_timeout: default_read_timeout(),
            recv_buffer: RECV_BUFFER_BYTES,
            expected_session_id: None,
        }
    }
}

/// How the session finished, from the caller's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Peer closed, or a fatal protocol condition terminated the session
    Ended,
    /// The transport failed (I/O error or read timeout)
    TransportFailed,
}

/// Everything left of a session once its loop returns
pub struct SessionSummary<S: Sink> {
    pub sink: S,
    pub outcome: SessionOutcome,
    pub stats: SessionStats,
}

/// Cloned transport handle for unblocking the session loop from outside
pub struct ShutdownHandle {
    stream: TcpStream,
}

impl ShutdownHandle {
    /// Close both directions; any blocked read in the loop returns promptly.
    pub fn shutdown(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

#[derive(Debug)]
pub struct ProfilerClient<S: Sink> {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    dispatcher: Dispatcher<S>,
}

impl<S: Sink> ProfilerClient<S> {
    /// Connect, configure the transport, and complete the handshake.
    ///
    /// The endpoint (and on adoption, the session identifier) is persisted as
    /// session properties through the sink.
    ///
    /// # Errors
    /// - [`SessionError::HandshakeMismatch`] when reconnecting to the wrong
    ///   target — distinct from transport trouble by design
    /// - [`SessionError::Storage`] if the sink cannot load prior state
    /// - I/O errors from connecting or from the preamble read
    pub fn connect(config: &ClientConfig, sink: S) -> Result<Self, SessionError> {
        let stream = TcpStream::connect((config.host.as_str(), config.port))?;
        stream.set_read_timeout(Some(config.read_timeout))?;
        // Mapping requests are a few bytes each; never batch them
        stream.set_nodelay(true)?;
        let writer = stream.try_clone()?;
        let mut reader = BufReader::with_capacity(config.recv_buffer, stream);

        let session = match config.expected_session_id {
            Some(id) => Session::with_expected_id(id),
            None => Session::new(),
        };
        let mut dispatcher = Dispatcher::new(session, sink)?;

        if let Err(e) = dispatcher.sink_mut().put_property("host", &config.host) {
            warn!("Failed to persist host property: {e}");
        }
        if let Err(e) = dispatcher.sink_mut().put_property("port", &config.port.to_string()) {
            warn!("Failed to persist port property: {e}");
        }

        let id = dispatcher.handshake(&mut reader)?;
        info!("Attached to {}:{} (session {id})", config.host, config.port);

        Ok(Self { reader, writer, dispatcher })
    }

    /// A handle that can later unblock and end the loop from another thread.
    ///
    /// # Errors
    /// Returns an error if the transport cannot be cloned.
    pub fn shutdown_handle(&self) -> Result<ShutdownHandle, SessionError> {
        Ok(ShutdownHandle { stream: self.writer.try_clone()? })
    }

    // ========================================================================
    // Target control (imperative, no reply expected)
    // ========================================================================

    /// Suspend the target process.
    ///
    /// # Errors
    /// Returns an error on transport failure.
    pub fn suspend_target(&mut self) -> Result<(), SessionError> {
        write_request(&mut self.writer, &Request::SuspendTarget)?;
        Ok(())
    }

    /// Resume a suspended target.
    ///
    /// # Errors
    /// Returns an error on transport failure.
    pub fn resume_target(&mut self) -> Result<(), SessionError> {
        write_request(&mut self.writer, &Request::ResumeTarget)?;
        Ok(())
    }

    /// Toggle the target's stack sampler.
    ///
    /// # Errors
    /// Returns an error on transport failure.
    pub fn set_sampler_active(&mut self, active: bool) -> Result<(), SessionError> {
        write_request(&mut self.writer, &Request::SetSamplerActive(active))?;
        Ok(())
    }

    /// Drive the receive loop until the session ends or the transport fails.
    ///
    /// Consumes the client: a finished session cannot be restarted, only
    /// reconnected from scratch.
    pub fn run(mut self) -> SessionSummary<S> {
        let outcome = loop {
            match self.dispatcher.process_next(&mut self.reader, &mut self.writer) {
                LoopOutcome::Progressed => {}
                LoopOutcome::Ended => break SessionOutcome::Ended,
                LoopOutcome::TransportFailed => break SessionOutcome::TransportFailed,
            }
        };

        let (sink, stats) = self.dispatcher.into_parts();
        info!("Session finished ({outcome:?}): {stats}");
        SessionSummary { sink, outcome, stats }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_sane() {
        let config = ClientConfig::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.recv_buffer >= 16 * 1024);
        assert!(config.read_timeout >= Duration::from_secs(1));
        assert!(config.expected_session_id.is_none());
    }
}
