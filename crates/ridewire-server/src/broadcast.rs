//! Broadcast coordinator: maps domain events to audiences.
//!
//! Every fan-out decision in the engine goes through these planning
//! functions, so the audience rules live in exactly one place:
//!
//! - ride offers reach the online-drivers group only;
//! - status transitions reach the ride's own room only;
//! - the completed-trip record additionally reaches every connection,
//!   because history and balance consumers listen globally;
//! - location and chat reach the ride room only, never the drivers group,
//!   never everyone. This is a privacy boundary, not a routing detail.

use ridewire_proto::{
    ChatRelay, DriverSummary, PassengerSummary, RideId, RideOffer, RideSession, RideStatus,
    ServerMessage, StatusUpdate, TripRecord,
};

use crate::rooms::Group;

/// One planned outbound message: what to say and to whom.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    /// Target group.
    pub group: Group,
    /// Message to deliver.
    pub message: ServerMessage,
}

/// A new ride was created: offer it to online drivers only.
pub fn ride_created(ride: RideSession, passenger: PassengerSummary) -> Outbound {
    Outbound {
        group: Group::OnlineDrivers,
        message: ServerMessage::NewRide(RideOffer { ride, passenger }),
    }
}

/// A ride was accepted: tell the ride's room, with the winner's identity.
pub fn ride_accepted(ride_id: RideId, driver: DriverSummary) -> Outbound {
    Outbound {
        group: Group::Ride(ride_id.clone()),
        message: ServerMessage::RideStatus(StatusUpdate {
            ride_id,
            status: RideStatus::Accepted,
            driver: Some(driver),
            final_price: None,
        }),
    }
}

/// A plain status transition (Arrived, InProgress, Cancelled): ride room
/// only.
pub fn status_changed(ride_id: RideId, status: RideStatus) -> Outbound {
    Outbound {
        group: Group::Ride(ride_id.clone()),
        message: ServerMessage::RideStatus(StatusUpdate {
            ride_id,
            status,
            driver: None,
            final_price: None,
        }),
    }
}

/// A trip completed: the ride room gets the final status, and every
/// connection gets the enriched record.
pub fn trip_finished(session: &RideSession, record: TripRecord) -> Vec<Outbound> {
    vec![
        Outbound {
            group: Group::Ride(session.id.clone()),
            message: ServerMessage::RideStatus(StatusUpdate {
                ride_id: session.id.clone(),
                status: RideStatus::Completed,
                driver: None,
                final_price: Some(session.price),
            }),
        },
        Outbound { group: Group::All, message: ServerMessage::TripFinished(record) },
    ]
}

/// Relay a driver position to the ride room, verbatim.
pub fn location_update(ride_id: RideId, lat: f64, lng: f64) -> Outbound {
    Outbound {
        group: Group::Ride(ride_id.clone()),
        message: ServerMessage::DriverLocation { ride_id, lat, lng },
    }
}

/// Relay a chat message to the ride room, verbatim.
pub fn chat_message(relay: ChatRelay) -> Outbound {
    Outbound {
        group: Group::Ride(relay.ride_id.clone()),
        message: ServerMessage::Chat(relay),
    }
}
