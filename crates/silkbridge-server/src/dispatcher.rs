//! Request dispatch onto the [`TaskManager`].
//!
//! Every handler failure becomes an `ERROR` response. Nothing here can end
//! a session.

use silkbridge_core::error::BridgeError;
use silkbridge_core::task::{CheckpointStore, TaskManager};
use silkbridge_core::traits::EngineProvider;
use thiserror::Error;
use tracing::{debug, warn};

use crate::framing::Frame;
use crate::protocol::{
    ActionResponse, InitResponse, ProtocolError, Request, RequestError, Response, TransitionAck,
};
use crate::state_machine::SessionStateMachine;

/// A request that could not be served. Reported to the client.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl DispatchError {
    /// The `ERROR` response sent for this failure.
    #[must_use]
    pub fn to_response(&self) -> Response {
        Response::error(self.to_string())
    }
}

/// Owns the task slot and turns requests into responses.
///
/// Outlives individual sessions: a client that reconnects continues with
/// the task that was active when it left.
#[derive(Debug)]
pub struct Dispatcher {
    tasks: TaskManager,
}

impl Dispatcher {
    pub const fn new(tasks: TaskManager) -> Self {
        Self { tasks }
    }

    /// Dispatcher over a fresh [`TaskManager`].
    pub fn with_provider(provider: Box<dyn EngineProvider>, checkpoints: CheckpointStore) -> Self {
        Self::new(TaskManager::new(provider, checkpoints))
    }

    pub const fn tasks(&self) -> &TaskManager {
        &self.tasks
    }

    /// Decode and handle one frame, stepping `session` through its phases.
    ///
    /// Decode and handler failures come back as `ERROR` responses; only an
    /// out-of-order session transition is returned as an error.
    pub fn handle_frame(
        &mut self,
        frame: &Frame,
        session: &mut SessionStateMachine,
    ) -> Result<Response, ProtocolError> {
        session.begin_decode()?;
        let response = match Request::from_frame(frame) {
            Ok(request) => {
                session.begin_dispatch()?;
                self.respond(request)
            }
            Err(e) => reject(&DispatchError::from(e)),
        };
        session.finish(&response)?;
        Ok(response)
    }

    /// Handle a decoded request, converting any failure into `ERROR`.
    pub fn respond(&mut self, request: Request) -> Response {
        let message = request.message_type();
        match self.dispatch(request) {
            Ok(response) => {
                debug!(%message, "request handled");
                response
            }
            Err(e) => reject(&e),
        }
    }

    /// Handle a decoded request.
    pub fn dispatch(&mut self, request: Request) -> Result<Response, DispatchError> {
        match request {
            Request::Initialize(spec) => {
                let outcome = self.tasks.reinitialize(&spec)?;
                Ok(Response::Init(InitResponse::from(outcome)))
            }
            Request::GetAction {
                state,
                deterministic,
            } => {
                let action = self.tasks.predict(&state, deterministic)?;
                Ok(Response::Action(ActionResponse { action }))
            }
            Request::StoreTransition(t) => {
                self.tasks
                    .store_transition(&t.state, t.action, t.reward, &t.next_state, t.done)?;
                Ok(Response::TransitionAck(TransitionAck { success: true }))
            }
        }
    }

    /// Persist the active engine at the end of a session. Failures are
    /// logged.
    pub fn end_session(&mut self) {
        match self.tasks.persist_active() {
            Ok(true) => debug!("active engine persisted at session end"),
            Ok(false) => {}
            Err(e) => warn!("failed to persist engine at session end: {e}"),
        }
    }
}

/// Log and convert a failure into an `ERROR` response.
pub fn reject(error: &DispatchError) -> Response {
    warn!("request failed: {error}");
    error.to_response()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
