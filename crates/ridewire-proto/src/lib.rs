//! Ridewire wire protocol.
//!
//! Defines the closed vocabulary spoken between clients and the dispatch
//! engine: domain value types ([`RideSession`], [`RideStatus`], ...), the
//! inbound [`ClientEvent`] enum (one tagged variant per event name), the
//! outbound [`ServerMessage`] enum, and the length-prefixed CBOR framing.
//!
//! Payloads are CBOR because it is self-describing (field names embedded),
//! compact, and needs no code generation. Every event is a typed variant;
//! there is no untyped payload path, so malformed input fails at decode
//! time and is answered with an explicit rejection.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod errors;
mod events;
mod messages;
mod types;
pub mod wire;

pub use errors::ProtocolError;
pub use events::ClientEvent;
pub use messages::{ChatRelay, Rejection, RideOffer, ServerMessage, StatusUpdate};
pub use types::{
    Coordinates, DriverSummary, PassengerSummary, RideId, RideSession, RideStatus, TripRecord,
    UserId, VehicleClass,
};

/// ALPN protocol identifier for QUIC transport negotiation.
pub const ALPN_PROTOCOL: &[u8] = b"ridewire";
