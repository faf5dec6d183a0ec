//! Wire format.
//!
//! Room payloads are bare bincode v2 bodies. On a relay stream every value
//! travels as a frame:
//!   [4 bytes big-endian length][bincode v2 payload]

use bincode::{Decode, Encode};

use crate::error::ProtocolError;

/// Maximum frame size (1 MiB). Prevents allocation bombs.
pub const MAX_MESSAGE_SIZE: u32 = 1024 * 1024;

/// Decoding config. Length prefixes inside a payload are untrusted, so the
/// decoder refuses to allocate more than a whole frame may carry.
fn decode_config() -> impl bincode::config::Config {
    bincode::config::standard().with_limit::<{ MAX_MESSAGE_SIZE as usize }>()
}

/// Encode a value as a bare bincode payload.
pub fn encode_payload<T: Encode>(msg: &T) -> Result<Vec<u8>, ProtocolError> {
    bincode::encode_to_vec(msg, bincode::config::standard())
        .map_err(|e| ProtocolError::Serialization(e.to_string()))
}

/// Decode a bare bincode payload, rejecting trailing bytes.
pub fn decode_payload<T: Decode<()>>(payload: &[u8]) -> Result<T, ProtocolError> {
    let (msg, read) = bincode::decode_from_slice(payload, decode_config())
        .map_err(|e| ProtocolError::Deserialization(e.to_string()))?;
    if read != payload.len() {
        return Err(ProtocolError::Deserialization(format!(
            "{} trailing bytes after message",
            payload.len() - read
        )));
    }
    Ok(msg)
}

/// Encode a value as a length-prefixed frame.
pub fn encode_frame<T: Encode>(msg: &T) -> Result<Vec<u8>, ProtocolError> {
    let payload = encode_payload(msg)?;

    let len = u32::try_from(payload.len())
        .map_err(|_| ProtocolError::Serialization("message too large".to_string()))?;
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::Serialization(format!(
            "message size {len} exceeds maximum {MAX_MESSAGE_SIZE}"
        )));
    }

    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Validate a frame header and return the payload length it announces.
pub fn frame_len(header: [u8; 4]) -> Result<usize, ProtocolError> {
    let len = u32::from_be_bytes(header);
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::Deserialization(format!(
            "message size {len} exceeds maximum {MAX_MESSAGE_SIZE}"
        )));
    }
    Ok(len as usize)
}
