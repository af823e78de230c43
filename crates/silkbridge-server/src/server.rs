//! TCP server for the game-client bridge.
//!
//! [`BridgeServer`] listens on a TCP port and handles one connection at a
//! time, feeding frames to a [`Dispatcher`] that outlives each connection.

use std::net::{SocketAddr, TcpListener, TcpStream};

use silkbridge_core::config::BridgeConfig;
use tracing::{debug, error, info, warn};

use crate::dispatcher::Dispatcher;
use crate::framing::{read_frame, write_frame};
use crate::protocol::ProtocolError;
use crate::state_machine::SessionStateMachine;

// ---------------------------------------------------------------------------
// SessionSummary
// ---------------------------------------------------------------------------

/// What happened on one connection that ended without a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub peer: SocketAddr,
    /// Frames answered, errors included.
    pub messages: u64,
    /// Frames answered with `ERROR`.
    pub errors: u64,
}

// ---------------------------------------------------------------------------
// BridgeServer
// ---------------------------------------------------------------------------

/// TCP server exposing a [`Dispatcher`] over the network.
///
/// Connections are served strictly one after another; later clients wait in
/// the listen backlog.
#[derive(Debug)]
pub struct BridgeServer {
    listener: TcpListener,
    nodelay: bool,
}

impl BridgeServer {
    /// Bind to the given address (e.g. `"127.0.0.1:8000"`).
    pub fn bind(addr: &str) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        Ok(Self {
            listener,
            nodelay: true,
        })
    }

    /// Bind to the address and socket options in `config`.
    pub fn bind_with_config(config: &BridgeConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind(config.bind_address())?;
        Ok(Self {
            listener,
            nodelay: config.server.nodelay,
        })
    }

    /// The local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept one client connection and run the request-response loop.
    ///
    /// Blocks until a client connects and returns when it disconnects. The
    /// active engine is persisted when the session ends, however it ends.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] on a fatal framing error or socket
    /// failure. The dispatcher stays usable for the next connection.
    pub fn serve_one(&self, dispatcher: &mut Dispatcher) -> Result<SessionSummary, ProtocolError> {
        let (stream, peer) = self.listener.accept()?;
        if let Err(e) = stream.set_nodelay(self.nodelay) {
            warn!(%peer, "failed to set TCP_NODELAY: {e}");
        }
        info!(%peer, "client connected");

        let mut sm = SessionStateMachine::new();
        let result = handle_connection(stream, dispatcher, &mut sm);
        sm.close();
        dispatcher.end_session();

        let summary = SessionSummary {
            peer,
            messages: sm.messages_handled(),
            errors: sm.recoverable_errors(),
        };
        result.map(|()| summary)
    }

    /// Serve connections forever.
    ///
    /// A session that ends in a fatal protocol or socket error is logged and
    /// the next connection is accepted.
    pub fn run(&self, dispatcher: &mut Dispatcher) -> ! {
        if let Ok(addr) = self.local_addr() {
            info!(%addr, "listening");
        }
        loop {
            match self.serve_one(dispatcher) {
                Ok(summary) => info!(
                    peer = %summary.peer,
                    messages = summary.messages,
                    errors = summary.errors,
                    "client disconnected"
                ),
                Err(ProtocolError::Io(e)) => warn!("session ended by socket error: {e}"),
                Err(e) => error!("session ended by protocol error: {e}"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Connection handler
// ---------------------------------------------------------------------------

fn handle_connection(
    stream: TcpStream,
    dispatcher: &mut Dispatcher,
    sm: &mut SessionStateMachine,
) -> Result<(), ProtocolError> {
    let mut reader = stream.try_clone()?;
    let mut writer = stream;

    while let Some(frame) = read_frame(&mut reader)? {
        debug!(message = %frame.message_type, bytes = frame.payload.len(), "frame received");
        let response = dispatcher.handle_frame(&frame, sm)?;
        write_frame(&mut writer, &response.to_frame()?)?;
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
