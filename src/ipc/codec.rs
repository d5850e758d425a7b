//! Length-prefixed frame encoding and decoding
//!
//! Every message on a Discord IPC endpoint is a frame:
//!
//! ```text
//! [opcode: u32 LE][length: u32 LE][payload: length bytes of UTF-8 JSON]
//! ```
//!
//! Decoding is a pure function over an accumulating buffer, so it can be fed
//! whatever chunks the transport happens to return.

use byteorder::{ByteOrder, LittleEndian};
use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use serde_json::Value;

use crate::error::{PresenceError, Result};
use crate::ipc::protocol::{constants::IPC_HEADER_SIZE, Opcode};

/// A decoded IPC frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: Opcode,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(opcode: Opcode, payload: impl Into<Bytes>) -> Self {
        Self {
            opcode,
            payload: payload.into(),
        }
    }

    /// Parse the payload as JSON
    pub fn json(&self) -> Result<Value> {
        serde_json::from_slice(&self.payload)
            .map_err(|e| PresenceError::MalformedFrame(format!("payload is not JSON: {}", e)))
    }
}

/// Encode a frame into its wire representation
pub fn encode(opcode: Opcode, payload: &[u8]) -> Bytes {
    let mut buffer = BytesMut::with_capacity(IPC_HEADER_SIZE + payload.len());
    buffer.put_u32_le(opcode.into());
    buffer.put_u32_le(payload.len() as u32);
    buffer.extend_from_slice(payload);
    buffer.freeze()
}

/// Serialize `payload` as JSON and encode it, rejecting payloads above `max_payload`
pub fn encode_json<T: Serialize + ?Sized>(
    opcode: Opcode,
    payload: &T,
    max_payload: u32,
) -> Result<Bytes> {
    let raw = serde_json::to_vec(payload)?;
    if raw.len() > max_payload as usize {
        return Err(PresenceError::MalformedFrame(format!(
            "Payload size {} exceeds maximum allowed size of {} bytes",
            raw.len(),
            max_payload
        )));
    }
    Ok(encode(opcode, &raw))
}

/// Decode one frame from the front of `buffer`
///
/// Returns the frame and the number of bytes it occupied. Fails with
/// [`PresenceError::IncompleteFrame`] when the buffer does not yet hold the
/// whole frame, and [`PresenceError::MalformedFrame`] when the header declares
/// a payload above `max_payload` or an unknown opcode.
pub fn decode(buffer: &[u8], max_payload: u32) -> Result<(Frame, usize)> {
    if buffer.len() < IPC_HEADER_SIZE {
        return Err(PresenceError::IncompleteFrame {
            needed: IPC_HEADER_SIZE,
            available: buffer.len(),
        });
    }

    let opcode_raw = LittleEndian::read_u32(&buffer[0..4]);
    let length = LittleEndian::read_u32(&buffer[4..8]);

    if length > max_payload {
        return Err(PresenceError::MalformedFrame(format!(
            "Payload size {} exceeds maximum allowed size of {} bytes",
            length, max_payload
        )));
    }

    let opcode = Opcode::try_from(opcode_raw)?;

    let total = IPC_HEADER_SIZE + length as usize;
    if buffer.len() < total {
        return Err(PresenceError::IncompleteFrame {
            needed: total,
            available: buffer.len(),
        });
    }

    let payload = Bytes::copy_from_slice(&buffer[IPC_HEADER_SIZE..total]);
    Ok((Frame { opcode, payload }, total))
}

/// Accumulates transport bytes and yields complete frames
#[derive(Debug)]
pub struct FrameReader {
    buffer: BytesMut,
    max_payload: u32,
}

impl FrameReader {
    /// Initial capacity for the read buffer (4KB)
    const INITIAL_BUFFER_CAPACITY: usize = 4096;

    pub fn new(max_payload: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(Self::INITIAL_BUFFER_CAPACITY),
            max_payload,
        }
    }

    /// The buffer transports append into
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Number of bytes buffered but not yet consumed by a frame
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Take the next complete frame, or `None` if more bytes are needed
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        match decode(&self.buffer, self.max_payload) {
            Ok((frame, consumed)) => {
                let _ = self.buffer.split_to(consumed);
                Ok(Some(frame))
            }
            Err(PresenceError::IncompleteFrame { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
