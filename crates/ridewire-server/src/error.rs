//! Server error types.

use std::fmt;

use crate::server_error::EngineError;

/// Errors that can occur in the server runtime.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error (invalid bind address, missing TLS certs, etc.).
    ///
    /// Fatal at startup. Fix configuration and restart.
    Config(String),

    /// Transport/network error (connection failure, I/O error, etc.).
    ///
    /// May be transient (network issues) or fatal (bind address in use).
    /// Check error message for details.
    Transport(String),

    /// Protocol error (malformed frame, oversized message, etc.).
    ///
    /// Indicates a client sent bad data. Fatal for that connection; the
    /// server keeps serving other clients.
    Protocol(String),

    /// Internal error (unexpected state, logic bug, etc.).
    ///
    /// Should never happen in correct operation. Fatal - report as issue.
    Internal(String),

    /// Engine error (from dispatch driver processing).
    ///
    /// Wraps errors from the core engine logic. See [`EngineError`].
    Engine(EngineError),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
            Self::Engine(err) => write!(f, "engine error: {err}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Engine(err) => Some(err),
            _ => None,
        }
    }
}

impl From<EngineError> for ServerError {
    fn from(err: EngineError) -> Self {
        Self::Engine(err)
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<ridewire_proto::ProtocolError> for ServerError {
    fn from(err: ridewire_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}
