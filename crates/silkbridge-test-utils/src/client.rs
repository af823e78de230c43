//! Blocking wire-protocol client for driving a server in tests.

use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use silkbridge_server::framing::{Frame, read_frame, write_frame};
use silkbridge_server::protocol::{MessageType, ProtocolError, Request, Response};

/// Minimal client speaking the framed protocol over one TCP connection.
pub struct TestClient {
    stream: TcpStream,
}

impl TestClient {
    /// Connect with a read timeout so a broken server fails the test instead
    /// of hanging it.
    pub fn connect(addr: SocketAddr) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(Duration::from_secs(10)))?;
        Ok(Self { stream })
    }

    /// Send a request and wait for its response.
    pub fn request(&mut self, request: &Request) -> Result<Response, ProtocolError> {
        self.send(&request.to_frame()?)?;
        self.read_response()?
            .ok_or_else(|| ProtocolError::Io(std::io::ErrorKind::UnexpectedEof.into()))
    }

    /// Send a frame with an arbitrary JSON payload.
    pub fn send_json(&mut self, message_type: MessageType, json: &str) -> Result<(), ProtocolError> {
        self.send(&Frame::new(message_type, json.as_bytes().to_vec()))
    }

    pub fn send(&mut self, frame: &Frame) -> Result<(), ProtocolError> {
        write_frame(&mut self.stream, frame)
    }

    /// Write raw bytes, bypassing framing.
    pub fn send_raw(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.stream.write_all(bytes)?;
        self.stream.flush()
    }

    /// Next response, or `None` once the server has closed the connection.
    pub fn read_response(&mut self) -> Result<Option<Response>, ProtocolError> {
        read_frame(&mut self.stream)?
            .map(|frame| Response::from_frame(&frame))
            .transpose()
    }

    /// Close the connection.
    pub fn close(self) {
        drop(self.stream);
    }
}
