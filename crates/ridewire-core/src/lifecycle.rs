//! Ride lifecycle state machine.
//!
//! Owns every mutation of a ride session. Each transition is issued as a
//! single conditional update against the store, so legality and atomicity
//! are enforced in the same step; there is no read-then-write anywhere on
//! the transition path. Store outages are retried with backoff before an
//! operation is reported failed.

use ridewire_proto::{
    Coordinates, DriverSummary, PassengerSummary, RideId, RideSession, RideStatus, TripRecord,
    UserId, VehicleClass,
};

use crate::{
    directory::{DirectoryError, UserDirectory, UserProfile},
    env::Environment,
    session::Transition,
    store::{RetryPolicy, RideStore, StoreError, with_retry},
};

/// Errors from lifecycle operations.
///
/// All are local to the triggering action: the initiating connection gets
/// an explicit rejection and nothing else is affected.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LifecycleError {
    /// Ride id unknown to the store.
    #[error("ride not found: {0}")]
    RideNotFound(RideId),

    /// User id unknown to the directory.
    #[error("unknown user: {0}")]
    UnknownUser(UserId),

    /// Guard failed: the ride was not in the expected predecessor status.
    #[error("illegal transition for ride {ride_id}: {from} -> {attempted}")]
    InvalidTransition {
        /// Ride the transition targeted.
        ride_id: RideId,
        /// Status actually stored.
        from: RideStatus,
        /// Status the transition would have moved to.
        attempted: RideStatus,
    },

    /// The conditional accept lost the assignment race. Expected under
    /// concurrency; a signaled rejection, not an error.
    #[error("assignment race lost for ride {0}")]
    RaceLost(RideId),

    /// A final-price override was not a positive amount.
    #[error("final price must be positive for ride {0}")]
    InvalidPrice(RideId),

    /// A completed ride had no assigned driver. Indicates a corrupted
    /// store record; the engine never writes one.
    #[error("ride {0} completed without an assigned driver")]
    MissingDriver(RideId),

    /// Store retries exhausted; the action was not applied.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// The ride lifecycle state machine.
///
/// Cloneable handle: clones share the same store and directory, so any
/// number of connection tasks can drive transitions concurrently. Ordering
/// per ride is anchored by the store's conditional update, not by this
/// struct.
#[derive(Clone)]
pub struct RideLifecycle<E, S, D> {
    env: E,
    store: S,
    directory: D,
    retry: RetryPolicy,
}

impl<E, S, D> RideLifecycle<E, S, D>
where
    E: Environment,
    S: RideStore,
    D: UserDirectory,
{
    /// Create a lifecycle over the given collaborators with the default
    /// retry policy.
    pub fn new(env: E, store: S, directory: D) -> Self {
        Self { env, store, directory, retry: RetryPolicy::default() }
    }

    /// Replace the store retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Create a new ride in `Requested` and return it with the passenger
    /// summary for the driver-facing offer.
    pub async fn create_ride(
        &self,
        passenger_id: UserId,
        origin: Coordinates,
        destination: Coordinates,
        price: u64,
        vehicle: VehicleClass,
    ) -> Result<(RideSession, PassengerSummary), LifecycleError> {
        let passenger = self.lookup_user(&passenger_id).await?;

        let session = RideSession {
            id: RideId::from_raw(self.env.random_u128()),
            passenger_id,
            driver_id: None,
            origin,
            destination,
            price,
            vehicle,
            status: RideStatus::Requested,
            created_at_secs: self.env.wall_clock_secs(),
        };

        with_retry(&self.env, &self.retry, || self.store.create(&session))
            .await
            .map_err(|e| Self::map_store_error(&session.id, e, None))?;

        Ok((session, passenger.passenger_summary()))
    }

    /// Atomically assign a driver to a `Requested` ride.
    ///
    /// Exactly one of any number of racing accepts succeeds; the rest get
    /// [`LifecycleError::RaceLost`]. The driver id and the status change
    /// are applied in the same conditional update.
    pub async fn accept_ride(
        &self,
        ride_id: &RideId,
        driver_id: &UserId,
    ) -> Result<(RideSession, DriverSummary), LifecycleError> {
        let driver = self.lookup_user(driver_id).await?;

        let session =
            self.apply(ride_id, &Transition::Accept { driver_id: driver_id.clone() }).await?;

        Ok((session, driver.driver_summary()))
    }

    /// Move an `Accepted` ride to `Arrived`.
    pub async fn mark_arrived(&self, ride_id: &RideId) -> Result<RideSession, LifecycleError> {
        self.apply(ride_id, &Transition::Arrive).await
    }

    /// Move an `Arrived` ride to `InProgress`.
    pub async fn start_trip(&self, ride_id: &RideId) -> Result<RideSession, LifecycleError> {
        self.apply(ride_id, &Transition::Start).await
    }

    /// Move an `InProgress` ride to `Completed`, optionally overriding the
    /// price, and build the enriched record for global fan-out.
    ///
    /// A zero override is rejected before anything is written. A ride
    /// already `Completed` is rejected as an illegal transition; the
    /// stored price is never silently overwritten twice.
    pub async fn finish_trip(
        &self,
        ride_id: &RideId,
        final_price: Option<u64>,
    ) -> Result<(RideSession, TripRecord), LifecycleError> {
        if final_price == Some(0) {
            return Err(LifecycleError::InvalidPrice(ride_id.clone()));
        }

        let session = self.apply(ride_id, &Transition::Finish { final_price }).await?;

        let passenger = self.lookup_user(&session.passenger_id).await?;
        let driver_id = session
            .driver_id
            .clone()
            .ok_or_else(|| LifecycleError::MissingDriver(session.id.clone()))?;
        let driver = self.lookup_user(&driver_id).await?;

        let record = TripRecord {
            ride_id: session.id.clone(),
            final_price: session.price,
            status: session.status,
            vehicle: session.vehicle,
            created_at_secs: session.created_at_secs,
            passenger: passenger.passenger_summary(),
            driver: driver.driver_summary(),
        };

        Ok((session, record))
    }

    /// Cancel a ride from any non-terminal status.
    ///
    /// Runs a read-then-CAS loop: if another transition wins between the
    /// read and the update, the loop re-reads and tries again; a terminal
    /// status ends it with an illegal-transition rejection.
    pub async fn cancel_ride(&self, ride_id: &RideId) -> Result<RideSession, LifecycleError> {
        loop {
            let current = with_retry(&self.env, &self.retry, || self.store.get(ride_id))
                .await
                .map_err(|e| Self::map_store_error(ride_id, e, None))?;

            if current.status.is_terminal() {
                return Err(LifecycleError::InvalidTransition {
                    ride_id: ride_id.clone(),
                    from: current.status,
                    attempted: RideStatus::Cancelled,
                });
            }

            let update = Transition::Cancel.update();
            let attempt = with_retry(&self.env, &self.retry, || {
                self.store.conditional_update(ride_id, current.status, update.clone())
            })
            .await;

            match attempt {
                Ok(session) => return Ok(session),
                // Another transition moved the ride; re-read and retry
                Err(StoreError::Precondition { .. }) => {},
                Err(e) => return Err(Self::map_store_error(ride_id, e, None)),
            }
        }
    }

    /// Issue one guarded transition as a single conditional update.
    async fn apply(
        &self,
        ride_id: &RideId,
        transition: &Transition,
    ) -> Result<RideSession, LifecycleError> {
        let Some(expected) = transition.required_status() else {
            // Cancel goes through cancel_ride's CAS loop
            return self.cancel_ride(ride_id).await;
        };

        let update = transition.update();
        with_retry(&self.env, &self.retry, || {
            self.store.conditional_update(ride_id, expected, update.clone())
        })
        .await
        .map_err(|e| Self::map_store_error(ride_id, e, Some(transition)))
    }

    async fn lookup_user(&self, user_id: &UserId) -> Result<UserProfile, LifecycleError> {
        self.directory.get(user_id).await.map_err(|e| match e {
            DirectoryError::NotFound(id) => LifecycleError::UnknownUser(id),
            DirectoryError::Unavailable(reason) => LifecycleError::Unavailable(reason),
        })
    }

    fn map_store_error(
        ride_id: &RideId,
        error: StoreError,
        transition: Option<&Transition>,
    ) -> LifecycleError {
        match error {
            StoreError::NotFound(id) => LifecycleError::RideNotFound(id),
            StoreError::Precondition { actual, .. } => match transition {
                Some(Transition::Accept { .. }) => LifecycleError::RaceLost(ride_id.clone()),
                Some(t) => LifecycleError::InvalidTransition {
                    ride_id: ride_id.clone(),
                    from: actual,
                    attempted: t.target_status(),
                },
                None => LifecycleError::InvalidTransition {
                    ride_id: ride_id.clone(),
                    from: actual,
                    attempted: RideStatus::Cancelled,
                },
            },
            StoreError::Unavailable(reason) => LifecycleError::Unavailable(reason),
        }
    }
}

impl<E, S, D> std::fmt::Debug for RideLifecycle<E, S, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RideLifecycle").field("retry", &self.retry).finish_non_exhaustive()
    }
}
