//! Inbound events, connection → engine.
//!
//! A closed set of tagged variants, one per event name. The tag lives in
//! the `event` field of the encoded map, so a malformed or unknown event
//! fails at decode time instead of reaching a handler.

use serde::{Deserialize, Serialize};

use crate::types::{Coordinates, RideId, UserId, VehicleClass};

/// An event sent by a connected client.
///
/// # Invariants
///
/// Every variant corresponds to exactly one event name; adding a variant
/// without a handler arm is a compile error in the dispatch driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Passenger requests a new ride.
    RequestRide {
        /// Requesting passenger.
        passenger_id: UserId,
        /// Pickup position.
        origin: Coordinates,
        /// Drop-off position.
        destination: Coordinates,
        /// Quoted price.
        price: u64,
        /// Requested vehicle category.
        vehicle: VehicleClass,
    },

    /// Join the connection to a ride's room.
    JoinRide {
        /// Target ride.
        ride_id: RideId,
    },

    /// Leave a ride's room.
    LeaveRide {
        /// Target ride.
        ride_id: RideId,
    },

    /// Mark a driver reachable for dispatch.
    DriverOnline {
        /// Driver coming online.
        driver_id: UserId,
    },

    /// Mark a driver unreachable.
    DriverOffline {
        /// Driver going offline.
        driver_id: UserId,
    },

    /// Driver attempts to take a requested ride.
    AcceptRide {
        /// Target ride.
        ride_id: RideId,
        /// Accepting driver.
        driver_id: UserId,
    },

    /// Driver reached the pickup point.
    DriverArrived {
        /// Target ride.
        ride_id: RideId,
    },

    /// Trip begins.
    StartTrip {
        /// Target ride.
        ride_id: RideId,
    },

    /// Trip ends, optionally overriding the quoted price.
    FinishTrip {
        /// Target ride.
        ride_id: RideId,
        /// Final price; absent keeps the stored price.
        #[serde(skip_serializing_if = "Option::is_none", default)]
        price: Option<u64>,
    },

    /// Driver position update, relayed to the ride room.
    UpdateLocation {
        /// Target ride.
        ride_id: RideId,
        /// Latitude in degrees.
        lat: f64,
        /// Longitude in degrees.
        lng: f64,
    },

    /// In-ride chat message, relayed to the ride room.
    ChatMessage {
        /// Target ride.
        ride_id: RideId,
        /// Author.
        sender_id: UserId,
        /// Message body, forwarded verbatim.
        message: String,
        /// Client-supplied timestamp, forwarded verbatim.
        timestamp: String,
    },
}

impl ClientEvent {
    /// Wire name of this event (the value of the `event` tag).
    pub fn name(&self) -> &'static str {
        match self {
            Self::RequestRide { .. } => "request_ride",
            Self::JoinRide { .. } => "join_ride",
            Self::LeaveRide { .. } => "leave_ride",
            Self::DriverOnline { .. } => "driver_online",
            Self::DriverOffline { .. } => "driver_offline",
            Self::AcceptRide { .. } => "accept_ride",
            Self::DriverArrived { .. } => "driver_arrived",
            Self::StartTrip { .. } => "start_trip",
            Self::FinishTrip { .. } => "finish_trip",
            Self::UpdateLocation { .. } => "update_location",
            Self::ChatMessage { .. } => "chat_message",
        }
    }
}
