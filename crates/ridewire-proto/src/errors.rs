//! Protocol error types.

/// Errors produced while encoding or decoding wire frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed. Indicates a bug: every message type encodes.
    #[error("encode failed: {0}")]
    Encode(String),

    /// The body was not a valid message. Fatal for that frame; the sender
    /// receives an `invalid_payload` rejection.
    #[error("decode failed: {0}")]
    Decode(String),

    /// A frame exceeded the size cap. The connection is closed.
    #[error("message too large: {len} bytes (max {max})")]
    Oversize {
        /// Announced or produced body size.
        len: usize,
        /// Configured cap.
        max: usize,
    },
}
