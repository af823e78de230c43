//! TCP bridge between a game client and a policy engine.
//!
//! This crate provides the communication layer of silkbridge:
//!
//! - [`protocol`] — message types, typed request/response payloads and
//!   protocol errors
//! - [`framing`] — length-prefixed typed frames (4-byte BE `u32` + type byte
//!   + JSON payload)
//! - [`dispatcher`] — [`Dispatcher`] mapping requests onto the task manager
//! - [`state_machine`] — [`SessionStateMachine`] tracking each message
//! - [`server`] — [`BridgeServer`] accepting one client at a time
//!
//! Recoverable failures are answered with an `ERROR` frame and the session
//! continues; malformed framing ends the session without a reply.

pub mod dispatcher;
pub mod framing;
pub mod protocol;
pub mod server;
pub mod state_machine;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use dispatcher::{DispatchError, Dispatcher};
pub use framing::Frame;
pub use protocol::{MAX_MESSAGE_SIZE, MessageType, ProtocolError, Request, RequestError, Response};
pub use server::{BridgeServer, SessionSummary};
pub use state_machine::{SessionPhase, SessionStateMachine};

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        BridgeServer, DispatchError, Dispatcher, Frame, SessionPhase, SessionStateMachine,
        SessionSummary,
        framing::{read_frame, write_frame},
        protocol::{
            MAX_MESSAGE_SIZE, MessageType, ProtocolError, Request, RequestError, Response,
        },
    };
}
