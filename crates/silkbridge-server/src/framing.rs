//! Length-prefixed, typed framing for the wire protocol.
//!
//! Every message on the wire is a 4-byte **big-endian** `u32` length, one
//! message-type byte and `length - 1` bytes of UTF-8 JSON payload.
//!
//! # Wire format
//!
//! ```text
//! +----------------+----------+------------------+
//! | Length (4B BE) | Type(1B) | JSON Payload     |
//! +----------------+----------+------------------+
//!   length = 1 + payload.len()
//! ```

use std::io::{ErrorKind, Read, Write};

use tracing::{debug, warn};

use crate::protocol::{MAX_MESSAGE_SIZE, MessageType, ProtocolError};

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// One decoded wire unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub message_type: MessageType,
    pub payload: Vec<u8>,
}

impl Frame {
    pub const fn new(message_type: MessageType, payload: Vec<u8>) -> Self {
        Self {
            message_type,
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

/// Read one frame from a stream.
///
/// Returns `Ok(None)` when the peer closes the stream, whether at a frame
/// boundary or part-way through one. A zero or oversized length and an
/// unknown type byte are fatal and returned as errors; the payload of such
/// a frame is not read.
pub fn read_frame(reader: &mut impl Read) -> Result<Option<Frame>, ProtocolError> {
    let mut len_buf = [0u8; 4];
    match read_full(reader, &mut len_buf)? {
        0 => {
            debug!("peer closed connection");
            return Ok(None);
        }
        4 => {}
        n => {
            warn!(read = n, "peer closed connection inside a length prefix");
            return Ok(None);
        }
    }

    let length = u32::from_be_bytes(len_buf) as usize;
    if length == 0 || length > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::InvalidLength {
            length,
            max: MAX_MESSAGE_SIZE,
        });
    }

    let mut type_buf = [0u8; 1];
    if read_full(reader, &mut type_buf)? == 0 {
        warn!(length, "peer closed connection before the type byte");
        return Ok(None);
    }
    let message_type = MessageType::try_from(type_buf[0])?;

    let mut payload = vec![0u8; length - 1];
    let got = read_full(reader, &mut payload)?;
    if got < payload.len() {
        warn!(
            message = %message_type,
            expected = payload.len(),
            got,
            "peer closed connection inside a payload"
        );
        return Ok(None);
    }

    Ok(Some(Frame::new(message_type, payload)))
}

/// Fill `buf` until it is full or the stream ends. Returns the bytes read.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

// ---------------------------------------------------------------------------
// Write
// ---------------------------------------------------------------------------

/// Encode a frame into a single buffer.
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>, ProtocolError> {
    let length = frame.payload.len() + 1;
    if length > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::InvalidLength {
            length,
            max: MAX_MESSAGE_SIZE,
        });
    }
    // MAX_MESSAGE_SIZE (16 MiB) fits in u32.
    let prefix = u32::try_from(length)
        .map_err(|_| ProtocolError::InvalidLength {
            length,
            max: MAX_MESSAGE_SIZE,
        })?
        .to_be_bytes();

    let mut buf = Vec::with_capacity(4 + length);
    buf.extend_from_slice(&prefix);
    buf.push(frame.message_type.as_u8());
    buf.extend_from_slice(&frame.payload);
    Ok(buf)
}

/// Write a frame with a single `write_all`, then flush.
pub fn write_frame(writer: &mut impl Write, frame: &Frame) -> Result<(), ProtocolError> {
    let buf = encode_frame(frame)?;
    writer.write_all(&buf)?;
    writer.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn raw(length: u32, type_byte: u8, payload: &[u8]) -> Vec<u8> {
        let mut data = length.to_be_bytes().to_vec();
        data.push(type_byte);
        data.extend_from_slice(payload);
        data
    }

    #[test]
    fn header_layout() {
        let frame = Frame::new(MessageType::GetAction, br#"{"state":[]}"#.to_vec());
        let buf = encode_frame(&frame).unwrap();
        let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        assert_eq!(len, frame.payload.len() + 1);
        assert_eq!(buf[4], 1);
        assert_eq!(&buf[5..], frame.payload.as_slice());
    }

    #[test]
    fn write_then_read() {
        let frame = Frame::new(MessageType::Error, br#"{"error":"x"}"#.to_vec());
        let mut buf = Vec::new();
        write_frame(&mut buf, &frame).unwrap();
        let mut cursor = Cursor::new(buf);
        assert_eq!(read_frame(&mut cursor).unwrap(), Some(frame));
    }

    #[test]
    fn empty_payload_frame() {
        let mut cursor = Cursor::new(raw(1, 0, &[]));
        let frame = read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(frame.message_type, MessageType::Initialize);
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn multiple_frames_in_sequence() {
        let mut buf = Vec::new();
        for t in [
            MessageType::Initialize,
            MessageType::GetAction,
            MessageType::StoreTransition,
        ] {
            write_frame(&mut buf, &Frame::new(t, b"{}".to_vec())).unwrap();
        }
        let mut cursor = Cursor::new(buf);
        let types: Vec<MessageType> = std::iter::from_fn(|| read_frame(&mut cursor).unwrap())
            .map(|f| f.message_type)
            .collect();
        assert_eq!(
            types,
            vec![
                MessageType::Initialize,
                MessageType::GetAction,
                MessageType::StoreTransition
            ]
        );
    }

    #[test]
    fn eof_at_boundary_returns_none() {
        let mut cursor = Cursor::new(Vec::new());
        assert!(read_frame(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn eof_inside_frame_returns_none() {
        // inside the length prefix
        let mut cursor = Cursor::new(vec![0, 0]);
        assert!(read_frame(&mut cursor).unwrap().is_none());

        // before the type byte
        let mut cursor = Cursor::new(5u32.to_be_bytes().to_vec());
        assert!(read_frame(&mut cursor).unwrap().is_none());

        // inside the payload
        let mut data = raw(10, 1, b"{\"st");
        data.truncate(9);
        let mut cursor = Cursor::new(data);
        assert!(read_frame(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn zero_length_is_fatal() {
        let mut cursor = Cursor::new(0u32.to_be_bytes().to_vec());
        assert!(matches!(
            read_frame(&mut cursor),
            Err(ProtocolError::InvalidLength { length: 0, .. })
        ));
    }

    #[test]
    fn oversized_length_is_fatal() {
        let too_big = u32::try_from(MAX_MESSAGE_SIZE).unwrap() + 1;
        let mut cursor = Cursor::new(too_big.to_be_bytes().to_vec());
        assert!(matches!(
            read_frame(&mut cursor),
            Err(ProtocolError::InvalidLength { .. })
        ));
    }

    #[test]
    fn unknown_type_is_fatal() {
        let mut cursor = Cursor::new(raw(3, 7, b"{}"));
        assert!(matches!(
            read_frame(&mut cursor),
            Err(ProtocolError::UnknownMessageType(7))
        ));
    }

    #[test]
    fn oversized_payload_is_not_encoded() {
        let frame = Frame::new(MessageType::ActionResponse, vec![b' '; MAX_MESSAGE_SIZE]);
        assert!(matches!(
            encode_frame(&frame),
            Err(ProtocolError::InvalidLength { .. })
        ));
    }
}
