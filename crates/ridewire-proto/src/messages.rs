//! Outbound messages, engine → connections.
//!
//! Each message names its audience implicitly through the broadcast plan
//! that produced it; nothing in this module sends anything. The per-ride
//! topic strings (`ride_status_<id>`, `driver_location_<id>`, `chat_<id>`)
//! are derived from the payload so room-scoped traffic stays keyed to its
//! ride.

use serde::{Deserialize, Serialize};

use crate::types::{DriverSummary, PassengerSummary, RideId, RideSession, RideStatus, TripRecord, UserId};

/// A ride offer pushed to the online-drivers group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideOffer {
    /// The freshly created ride.
    pub ride: RideSession,
    /// Passenger identity for the driver's offer screen.
    pub passenger: PassengerSummary,
}

/// A lifecycle status change, scoped to one ride's room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// Ride the update belongs to.
    pub ride_id: RideId,
    /// New status.
    pub status: RideStatus,
    /// Winning driver's identity; present only on `Accepted`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub driver: Option<DriverSummary>,
    /// Final price; present only on `Completed`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub final_price: Option<u64>,
}

/// A chat message relayed verbatim to a ride's room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRelay {
    /// Ride the chat belongs to.
    pub ride_id: RideId,
    /// Author.
    pub sender_id: UserId,
    /// Message body.
    pub message: String,
    /// Client-supplied timestamp.
    pub timestamp: String,
}

/// Explicit refusal of a client action, sent only to the initiating
/// connection.
///
/// Dropping an action silently is a defect; every guard failure, unknown
/// id, lost race, or exhausted store retry produces one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// Stable code identifying the refusal.
    pub code: u16,
    /// Human-readable explanation.
    pub message: String,
    /// Ride the refused action targeted, when one was named.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ride_id: Option<RideId>,
}

impl Rejection {
    /// Ride id unknown to the store.
    pub const RIDE_NOT_FOUND: u16 = 0x0001;
    /// User id unknown to the directory.
    pub const UNKNOWN_USER: u16 = 0x0002;
    /// Transition guard failed: status was not the expected predecessor.
    pub const INVALID_TRANSITION: u16 = 0x0003;
    /// Another driver won the assignment race.
    pub const RIDE_TAKEN: u16 = 0x0004;
    /// Store retries exhausted; the action was not applied.
    pub const STORE_UNAVAILABLE: u16 = 0x0005;
    /// Accept attempted by a connection not in the online-drivers group.
    pub const NOT_ONLINE: u16 = 0x0006;
    /// Relay attempted by a connection outside the ride's room.
    pub const NOT_IN_ROOM: u16 = 0x0007;
    /// Event failed to decode or validate.
    pub const INVALID_PAYLOAD: u16 = 0x0008;
    /// Final-price override was not a positive amount.
    pub const INVALID_PRICE: u16 = 0x0009;

    /// Ride id unknown to the store.
    pub fn ride_not_found(ride_id: RideId) -> Self {
        Self {
            code: Self::RIDE_NOT_FOUND,
            message: format!("ride not found: {ride_id}"),
            ride_id: Some(ride_id),
        }
    }

    /// User id unknown to the directory.
    pub fn unknown_user(user_id: &UserId) -> Self {
        Self {
            code: Self::UNKNOWN_USER,
            message: format!("unknown user: {user_id}"),
            ride_id: None,
        }
    }

    /// Transition guard failed.
    pub fn invalid_transition(ride_id: RideId, from: RideStatus, attempted: RideStatus) -> Self {
        Self {
            code: Self::INVALID_TRANSITION,
            message: format!("illegal transition {from} -> {attempted}"),
            ride_id: Some(ride_id),
        }
    }

    /// Another driver already took the ride.
    pub fn ride_taken(ride_id: RideId) -> Self {
        Self {
            code: Self::RIDE_TAKEN,
            message: "ride already taken".to_string(),
            ride_id: Some(ride_id),
        }
    }

    /// Store retries exhausted.
    pub fn store_unavailable(ride_id: Option<RideId>, reason: impl Into<String>) -> Self {
        Self { code: Self::STORE_UNAVAILABLE, message: reason.into(), ride_id }
    }

    /// Accept from a connection that is not an online driver.
    pub fn not_online(ride_id: RideId) -> Self {
        Self {
            code: Self::NOT_ONLINE,
            message: "driver is not online".to_string(),
            ride_id: Some(ride_id),
        }
    }

    /// Relay from a connection outside the ride's room.
    pub fn not_in_room(ride_id: RideId) -> Self {
        Self {
            code: Self::NOT_IN_ROOM,
            message: "connection has not joined this ride".to_string(),
            ride_id: Some(ride_id),
        }
    }

    /// Event failed to decode or validate.
    pub fn invalid_payload(reason: impl Into<String>) -> Self {
        Self { code: Self::INVALID_PAYLOAD, message: reason.into(), ride_id: None }
    }

    /// Final-price override was not positive.
    pub fn invalid_price(ride_id: RideId) -> Self {
        Self {
            code: Self::INVALID_PRICE,
            message: "final price must be positive".to_string(),
            ride_id: Some(ride_id),
        }
    }
}

/// A message sent by the engine to one or more connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Acknowledgment to the requesting passenger: the ride exists.
    RideCreated {
        /// The persisted ride.
        ride: RideSession,
    },
    /// New ride offer, for the online-drivers group only.
    NewRide(RideOffer),
    /// Lifecycle status change, for the ride's room only.
    RideStatus(StatusUpdate),
    /// Enriched completed-trip record, for every connection.
    TripFinished(TripRecord),
    /// Driver position, for the ride's room only.
    DriverLocation {
        /// Ride the position belongs to.
        ride_id: RideId,
        /// Latitude in degrees.
        lat: f64,
        /// Longitude in degrees.
        lng: f64,
    },
    /// Chat relay, for the ride's room only.
    Chat(ChatRelay),
    /// Explicit refusal, for the initiating connection only.
    Rejection(Rejection),
}

impl ServerMessage {
    /// Topic this message is addressed under.
    ///
    /// Room-scoped traffic carries a per-ride suffix so a client can key
    /// handlers by the ride it joined.
    pub fn topic(&self) -> String {
        match self {
            Self::RideCreated { .. } => "ride_created".to_string(),
            Self::NewRide(_) => "new_ride".to_string(),
            Self::RideStatus(update) => format!("ride_status_{}", update.ride_id),
            Self::TripFinished(_) => "trip_finished".to_string(),
            Self::DriverLocation { ride_id, .. } => format!("driver_location_{ride_id}"),
            Self::Chat(chat) => format!("chat_{}", chat.ride_id),
            Self::Rejection(_) => "rejection".to_string(),
        }
    }
}
