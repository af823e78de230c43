//! Per-connection session state machine.
//!
//! [`SessionStateMachine`] walks each message through
//! `AwaitingMessage → Decoding → Dispatching → AwaitingMessage` and ends in
//! `Closed`. A decode failure goes straight from `Decoding` back to
//! `AwaitingMessage` with an error response.
//!
//! ```text
//!                 frame read            request decoded
//! AwaitingMessage ──────────▶ Decoding ───────────────▶ Dispatching
//!        ▲                       │                          │
//!        └────── response sent ──┴──────────────────────────┘
//!
//! any phase ── EOF / fatal error ──▶ Closed
//! ```

use crate::protocol::{ProtocolError, Response};

/// Where a session is in its message cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    AwaitingMessage,
    Decoding,
    Dispatching,
    Closed,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::AwaitingMessage => "AwaitingMessage",
            Self::Decoding => "Decoding",
            Self::Dispatching => "Dispatching",
            Self::Closed => "Closed",
        };
        f.write_str(name)
    }
}

/// Tracks the session phase and counts handled messages.
///
/// # Example
///
/// ```
/// use silkbridge_server::protocol::Response;
/// use silkbridge_server::state_machine::{SessionPhase, SessionStateMachine};
///
/// let mut sm = SessionStateMachine::new();
/// sm.begin_decode().unwrap();
/// sm.finish(&Response::error("bad payload")).unwrap();
/// assert_eq!(sm.phase(), SessionPhase::AwaitingMessage);
/// assert_eq!(sm.recoverable_errors(), 1);
/// ```
#[derive(Debug)]
pub struct SessionStateMachine {
    phase: SessionPhase,
    messages: u64,
    errors: u64,
}

impl SessionStateMachine {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: SessionPhase::AwaitingMessage,
            messages: 0,
            errors: 0,
        }
    }

    #[must_use]
    pub const fn phase(&self) -> SessionPhase {
        self.phase
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self.phase, SessionPhase::Closed)
    }

    /// Messages answered so far, errors included.
    #[must_use]
    pub const fn messages_handled(&self) -> u64 {
        self.messages
    }

    /// Messages answered with an `ERROR` response.
    #[must_use]
    pub const fn recoverable_errors(&self) -> u64 {
        self.errors
    }

    /// A frame has been read.
    pub fn begin_decode(&mut self) -> Result<(), ProtocolError> {
        self.transition(SessionPhase::AwaitingMessage, SessionPhase::Decoding)
    }

    /// The frame decoded into a request.
    pub fn begin_dispatch(&mut self) -> Result<(), ProtocolError> {
        self.transition(SessionPhase::Decoding, SessionPhase::Dispatching)
    }

    /// A response has been produced for the current message.
    pub fn finish(&mut self, response: &Response) -> Result<(), ProtocolError> {
        match self.phase {
            SessionPhase::Decoding | SessionPhase::Dispatching => {
                self.phase = SessionPhase::AwaitingMessage;
                self.messages += 1;
                if response.is_error() {
                    self.errors += 1;
                }
                Ok(())
            }
            from => Err(ProtocolError::InvalidTransition {
                from,
                to: SessionPhase::AwaitingMessage,
            }),
        }
    }

    /// End the session. Allowed from any phase.
    pub const fn close(&mut self) {
        self.phase = SessionPhase::Closed;
    }

    fn transition(&mut self, from: SessionPhase, to: SessionPhase) -> Result<(), ProtocolError> {
        if self.phase != from {
            return Err(ProtocolError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        self.phase = to;
        Ok(())
    }
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
