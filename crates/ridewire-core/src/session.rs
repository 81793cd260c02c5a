//! Ride lifecycle transition table.
//!
//! Encodes the forward-only transition graph
//! `Requested → Accepted → Arrived → InProgress → Completed`, with
//! `Cancelled` reachable from any non-terminal status. Each transition
//! names the exact predecessor it requires; the store's conditional update
//! enforces it atomically.

use ridewire_proto::{RideStatus, UserId};

use crate::store::RideUpdate;

/// A requested lifecycle transition.
///
/// # Invariants
///
/// - `Accept` is the only transition that attaches a driver id, and it
///   does so in the same atomic step that leaves `Requested`.
/// - `Finish` is the only transition that may change the price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// `Requested → Accepted`, attaching the winning driver.
    Accept {
        /// Driver winning the assignment.
        driver_id: UserId,
    },
    /// `Accepted → Arrived`.
    Arrive,
    /// `Arrived → InProgress`.
    Start,
    /// `InProgress → Completed`, optionally overriding the price.
    Finish {
        /// Final price; `None` keeps the stored price.
        final_price: Option<u64>,
    },
    /// Any non-terminal status `→ Cancelled`.
    Cancel,
}

impl Transition {
    /// The exact status this transition requires, or `None` when any
    /// non-terminal status is acceptable (`Cancel`).
    pub fn required_status(&self) -> Option<RideStatus> {
        match self {
            Self::Accept { .. } => Some(RideStatus::Requested),
            Self::Arrive => Some(RideStatus::Accepted),
            Self::Start => Some(RideStatus::Arrived),
            Self::Finish { .. } => Some(RideStatus::InProgress),
            Self::Cancel => None,
        }
    }

    /// The status this transition moves the ride to.
    pub fn target_status(&self) -> RideStatus {
        match self {
            Self::Accept { .. } => RideStatus::Accepted,
            Self::Arrive => RideStatus::Arrived,
            Self::Start => RideStatus::InProgress,
            Self::Finish { .. } => RideStatus::Completed,
            Self::Cancel => RideStatus::Cancelled,
        }
    }

    /// The field changes this transition applies alongside the status.
    pub fn update(&self) -> RideUpdate {
        match self {
            Self::Accept { driver_id } => RideUpdate {
                status: RideStatus::Accepted,
                driver_id: Some(driver_id.clone()),
                price: None,
            },
            Self::Finish { final_price } => RideUpdate {
                status: RideStatus::Completed,
                driver_id: None,
                price: *final_price,
            },
            other => RideUpdate { status: other.target_status(), driver_id: None, price: None },
        }
    }
}
