//! Domain value types shared by the wire protocol and the engine.
//!
//! Identifiers are opaque strings at the system boundary. Ride ids are
//! generated by the engine from 128 bits of randomness; user ids come from
//! the user directory and are never interpreted.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique ride identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RideId(String);

impl RideId {
    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive an identifier from 128 bits of randomness.
    pub fn from_raw(raw: u128) -> Self {
        Self(format!("{raw:032x}"))
    }

    /// Identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RideId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique user identifier (passenger or driver).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ride lifecycle status.
///
/// Statuses only move forward along
/// `Requested → Accepted → Arrived → InProgress → Completed`; `Cancelled`
/// is reachable from any non-terminal status. The legality of each step is
/// enforced by the lifecycle guards, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RideStatus {
    /// Created by a passenger, no driver assigned yet.
    Requested,
    /// A driver won the assignment race.
    Accepted,
    /// The driver reached the pickup point.
    Arrived,
    /// The trip is underway.
    InProgress,
    /// The trip ended normally. Terminal.
    Completed,
    /// The ride was cancelled before completion. Terminal.
    Cancelled,
}

impl RideStatus {
    /// Whether no further transition is legal from this status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Requested => "REQUESTED",
            Self::Accepted => "ACCEPTED",
            Self::Arrived => "ARRIVED",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

/// WGS84 position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

/// Vehicle category requested for a ride.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleClass {
    /// Two-wheeler.
    Moto,
    /// Standard car.
    Car,
    /// Large vehicle.
    Van,
}

impl fmt::Display for VehicleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Moto => "moto",
            Self::Car => "car",
            Self::Van => "van",
        };
        f.write_str(name)
    }
}

/// A ride as persisted by the ride store.
///
/// The store is the durable source of truth for this record; any in-memory
/// copy is a cache. The driver id is attached exactly once, by the same
/// conditional update that moves the status out of `Requested`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideSession {
    /// Ride identifier.
    pub id: RideId,
    /// Passenger who requested the ride.
    pub passenger_id: UserId,
    /// Assigned driver, absent until the ride is accepted.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub driver_id: Option<UserId>,
    /// Pickup position.
    pub origin: Coordinates,
    /// Drop-off position.
    pub destination: Coordinates,
    /// Quoted price, possibly overwritten by the final price at completion.
    pub price: u64,
    /// Requested vehicle category.
    pub vehicle: VehicleClass,
    /// Current lifecycle status.
    pub status: RideStatus,
    /// Creation time, Unix seconds.
    pub created_at_secs: u64,
}

/// Passenger identity attached to ride offers and trip records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassengerSummary {
    /// Passenger identifier.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Contact phone number.
    pub phone: String,
}

/// Driver identity and vehicle details attached to acceptance updates and
/// trip records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverSummary {
    /// Driver identifier.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Contact phone number.
    pub phone: String,
    /// Rendered vehicle description ("Make Model • Color").
    pub vehicle_info: String,
    /// Registration plate.
    pub license_plate: String,
    /// Average rating.
    pub rating: f32,
}

/// Denormalized completed-trip record broadcast to every connection.
///
/// History and balance consumers listen globally instead of joining ride
/// rooms, so this record carries everything they need in one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRecord {
    /// Ride identifier.
    pub ride_id: RideId,
    /// Final price after any completion override.
    pub final_price: u64,
    /// Status at emission time (always `Completed`).
    pub status: RideStatus,
    /// Vehicle category.
    pub vehicle: VehicleClass,
    /// Ride creation time, Unix seconds.
    pub created_at_secs: u64,
    /// Passenger identity.
    pub passenger: PassengerSummary,
    /// Driver identity.
    pub driver: DriverSummary,
}
