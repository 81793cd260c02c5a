//! Length-prefixed CBOR framing.
//!
//! Every message on a stream is a 4-byte big-endian length followed by a
//! CBOR body. The length counts the body only. Bodies above
//! [`MAX_MESSAGE_SIZE`] are refused on both ends; a peer announcing an
//! oversized frame is disconnected rather than buffered.

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::errors::ProtocolError;

/// Upper bound on an encoded message body, in bytes.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Size of the length prefix, in bytes.
pub const LEN_PREFIX_SIZE: usize = 4;

/// Encode a message as a length-prefixed CBOR frame.
pub fn encode<T: Serialize>(message: &T) -> Result<Bytes, ProtocolError> {
    let mut body = Vec::new();
    ciborium::ser::into_writer(message, &mut body)
        .map_err(|e| ProtocolError::Encode(e.to_string()))?;

    if body.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::Oversize { len: body.len(), max: MAX_MESSAGE_SIZE });
    }

    let mut frame = BytesMut::with_capacity(LEN_PREFIX_SIZE + body.len());
    frame.put_u32(body.len() as u32);
    frame.put_slice(&body);
    Ok(frame.freeze())
}

/// Decode a CBOR body (the bytes after the length prefix).
pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, ProtocolError> {
    ciborium::de::from_reader(body).map_err(|e| ProtocolError::Decode(e.to_string()))
}

/// Validate a length prefix and return the body size to read.
pub fn body_len(prefix: [u8; LEN_PREFIX_SIZE]) -> Result<usize, ProtocolError> {
    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::Oversize { len, max: MAX_MESSAGE_SIZE });
    }
    Ok(len)
}
