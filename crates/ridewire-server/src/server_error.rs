//! Engine error types.
//!
//! Covers the driver's own failure modes: connection routing problems and
//! lifecycle failures surfaced through the engine's public methods.
//! Per-client action failures are not errors; they become rejection
//! messages to the initiating connection.

use std::fmt;

use ridewire_core::LifecycleError;

/// Errors from dispatch driver operations.
#[derive(Debug)]
pub enum EngineError {
    /// Connection not registered with the router.
    ///
    /// An event arrived for a connection the engine does not know. May be
    /// transient if the connection just closed; the runtime drops the
    /// event and the stream it came from.
    ConnectionNotFound(u64),

    /// Connection id already registered.
    ///
    /// Connection ids are 64 random bits assigned by the runtime; a
    /// collision indicates a logic bug, not bad input. Fatal - report as
    /// issue.
    ConnectionAlreadyExists(u64),

    /// A lifecycle operation invoked through the engine's public surface
    /// failed.
    ///
    /// See [`LifecycleError`] for the cause; store outages are already
    /// retried before this surfaces.
    Lifecycle(LifecycleError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionNotFound(id) => write!(f, "connection not found: {id}"),
            Self::ConnectionAlreadyExists(id) => write!(f, "connection already exists: {id}"),
            Self::Lifecycle(err) => write!(f, "lifecycle error: {err}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Lifecycle(err) => Some(err),
            _ => None,
        }
    }
}

impl From<LifecycleError> for EngineError {
    fn from(err: LifecycleError) -> Self {
        Self::Lifecycle(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_error_display() {
        let err = EngineError::ConnectionNotFound(42);
        assert_eq!(err.to_string(), "connection not found: 42");

        let err = EngineError::ConnectionAlreadyExists(7);
        assert_eq!(err.to_string(), "connection already exists: 7");
    }
}
