//! Dispatch driver.
//!
//! The engine's entry point: ties the ride lifecycle, the room router, and
//! the presence registry together, turning inbound connection events into
//! outbound actions for the runtime to execute. The driver itself performs
//! no I/O.
//!
//! Concurrency model: the driver is a cheap cloneable handle; connection
//! tasks call [`DispatchDriver::process_event`] concurrently. Router and
//! presence mutations happen under short-held locks with no await beneath
//! them, so transitions for different rides never block one another.
//! Same-ride ordering is anchored by the store's conditional update, not
//! by any lock here.

use std::sync::{Arc, Mutex, MutexGuard};

use ridewire_core::{Environment, LifecycleError, RideLifecycle, RideStore, UserDirectory};
use ridewire_proto::{ChatRelay, ClientEvent, Coordinates, Rejection, RideId, ServerMessage, UserId, VehicleClass};

use crate::{
    broadcast::{self, Outbound},
    presence::PresenceRegistry,
    rooms::{Group, RoomRouter},
    server_error::EngineError,
};

/// Dispatch configuration.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Maximum concurrent connections.
    pub max_connections: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { max_connections: 10_000 }
    }
}

/// Events the dispatch driver processes.
///
/// Produced by the runtime, one per inbound connection event.
#[derive(Debug, Clone)]
pub enum DispatchEvent {
    /// A new connection was accepted.
    ConnectionOpened {
        /// Connection id assigned by the runtime.
        conn_id: u64,
    },

    /// A decoded client event arrived on a connection.
    EventReceived {
        /// Originating connection.
        conn_id: u64,
        /// The event.
        event: ClientEvent,
    },

    /// A connection was closed (by peer or error).
    ConnectionClosed {
        /// Closed connection.
        conn_id: u64,
        /// Reason for closure.
        reason: String,
    },
}

/// Actions the dispatch driver produces for the runtime to execute.
#[derive(Debug, Clone)]
pub enum DispatchAction {
    /// Send a message to one connection.
    Send {
        /// Target connection.
        conn_id: u64,
        /// Message to deliver.
        message: ServerMessage,
    },

    /// Deliver a message to every member of a group.
    Broadcast {
        /// Target group.
        group: Group,
        /// Message to deliver.
        message: ServerMessage,
        /// Connection to skip, if any.
        exclude: Option<u64>,
    },

    /// Close a connection.
    Close {
        /// Connection to close.
        conn_id: u64,
        /// Reason for closure.
        reason: String,
    },

    /// Emit a log line.
    Log {
        /// Severity.
        level: LogLevel,
        /// Message to log.
        message: String,
    },
}

/// Log levels carried on [`DispatchAction::Log`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Diagnostic detail.
    Debug,
    /// Normal operation.
    Info,
    /// Rejected or dropped input.
    Warn,
    /// Failure needing attention.
    Error,
}

/// Event-to-actions dispatch coordinator.
#[derive(Clone)]
pub struct DispatchDriver<E, S, D> {
    lifecycle: RideLifecycle<E, S, D>,
    rooms: Arc<Mutex<RoomRouter>>,
    presence: Arc<Mutex<PresenceRegistry>>,
    config: DispatchConfig,
}

impl<E, S, D> DispatchDriver<E, S, D>
where
    E: Environment,
    S: RideStore,
    D: UserDirectory,
{
    /// Create a driver over the given lifecycle.
    pub fn new(lifecycle: RideLifecycle<E, S, D>, config: DispatchConfig) -> Self {
        Self {
            lifecycle,
            rooms: Arc::new(Mutex::new(RoomRouter::new())),
            presence: Arc::new(Mutex::new(PresenceRegistry::new())),
            config,
        }
    }

    /// Process one event and return the actions to execute.
    ///
    /// Failures of a single client action never surface here; they become
    /// [`DispatchAction::Send`] rejections to the initiating connection.
    /// An `Err` means the event itself was unroutable (unknown or
    /// duplicate connection).
    pub async fn process_event(
        &self,
        event: DispatchEvent,
    ) -> Result<Vec<DispatchAction>, EngineError> {
        match event {
            DispatchEvent::ConnectionOpened { conn_id } => self.handle_connection_opened(conn_id),
            DispatchEvent::EventReceived { conn_id, event } => {
                self.handle_event(conn_id, event).await
            },
            DispatchEvent::ConnectionClosed { conn_id, reason } => {
                Ok(self.handle_connection_closed(conn_id, &reason))
            },
        }
    }

    /// Cancel a ride from outside the connection path (support tooling,
    /// payment failures, timeouts). The ride's room is notified.
    pub async fn cancel_ride(&self, ride_id: &RideId) -> Result<Vec<DispatchAction>, EngineError> {
        let session = self.lifecycle.cancel_ride(ride_id).await?;

        let plan = broadcast::status_changed(session.id.clone(), session.status);
        Ok(vec![
            to_broadcast(plan),
            log(LogLevel::Info, format!("ride {} cancelled", session.id)),
        ])
    }

    /// Snapshot of a group's member connections, for fan-out.
    pub fn group_members(&self, group: &Group) -> Vec<u64> {
        self.rooms().members_of(group)
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.rooms().connection_count()
    }

    fn handle_connection_opened(&self, conn_id: u64) -> Result<Vec<DispatchAction>, EngineError> {
        let mut rooms = self.rooms();

        if rooms.connection_count() >= self.config.max_connections {
            return Ok(vec![DispatchAction::Close {
                conn_id,
                reason: "max connections exceeded".to_string(),
            }]);
        }

        if !rooms.register(conn_id) {
            return Err(EngineError::ConnectionAlreadyExists(conn_id));
        }

        Ok(vec![log(LogLevel::Debug, format!("connection {conn_id} accepted"))])
    }

    async fn handle_event(
        &self,
        conn_id: u64,
        event: ClientEvent,
    ) -> Result<Vec<DispatchAction>, EngineError> {
        if !self.rooms().is_registered(conn_id) {
            return Err(EngineError::ConnectionNotFound(conn_id));
        }

        let actions = match event {
            ClientEvent::JoinRide { ride_id } => self.handle_join(conn_id, ride_id),
            ClientEvent::LeaveRide { ride_id } => self.handle_leave(conn_id, ride_id),
            ClientEvent::DriverOnline { driver_id } => {
                self.handle_driver_online(conn_id, driver_id)
            },
            ClientEvent::DriverOffline { driver_id } => self.handle_driver_offline(&driver_id),
            ClientEvent::RequestRide { passenger_id, origin, destination, price, vehicle } => {
                self.handle_request_ride(conn_id, passenger_id, origin, destination, price, vehicle)
                    .await
            },
            ClientEvent::AcceptRide { ride_id, driver_id } => {
                self.handle_accept(conn_id, ride_id, driver_id).await
            },
            ClientEvent::DriverArrived { ride_id } => {
                self.handle_transition(conn_id, ride_id, Step::Arrive).await
            },
            ClientEvent::StartTrip { ride_id } => {
                self.handle_transition(conn_id, ride_id, Step::Start).await
            },
            ClientEvent::FinishTrip { ride_id, price } => {
                self.handle_finish(conn_id, ride_id, price).await
            },
            ClientEvent::UpdateLocation { ride_id, lat, lng } => {
                self.handle_location(conn_id, ride_id, lat, lng)
            },
            ClientEvent::ChatMessage { ride_id, sender_id, message, timestamp } => self
                .handle_chat(conn_id, ChatRelay { ride_id, sender_id, message, timestamp }),
        };

        Ok(actions)
    }

    fn handle_join(&self, conn_id: u64, ride_id: RideId) -> Vec<DispatchAction> {
        let group = Group::Ride(ride_id);
        self.rooms().join(conn_id, group.clone());
        vec![log(LogLevel::Debug, format!("connection {conn_id} joined {group}"))]
    }

    fn handle_leave(&self, conn_id: u64, ride_id: RideId) -> Vec<DispatchAction> {
        let group = Group::Ride(ride_id);
        self.rooms().leave(conn_id, &group);
        vec![log(LogLevel::Debug, format!("connection {conn_id} left {group}"))]
    }

    fn handle_driver_online(
        &self,
        conn_id: u64,
        driver_id: UserId,
    ) -> Vec<DispatchAction> {
        let displaced = self.presence().mark_online(driver_id.clone(), conn_id);

        let mut rooms = self.rooms();
        rooms.join(conn_id, Group::OnlineDrivers);
        if let Some(stale) = displaced {
            rooms.leave(stale, &Group::OnlineDrivers);
        }
        drop(rooms);

        let mut actions = vec![log(LogLevel::Info, format!("driver {driver_id} online"))];
        if displaced.is_some() {
            actions.push(log(
                LogLevel::Debug,
                format!("driver {driver_id} reconnected, stale connection displaced"),
            ));
        }
        actions
    }

    fn handle_driver_offline(&self, driver_id: &UserId) -> Vec<DispatchAction> {
        let Some(conn_id) = self.presence().mark_offline_driver(driver_id) else {
            // Already offline; nothing to purge
            return vec![log(LogLevel::Debug, format!("driver {driver_id} was not online"))];
        };

        self.rooms().leave(conn_id, &Group::OnlineDrivers);
        vec![log(LogLevel::Info, format!("driver {driver_id} offline"))]
    }

    async fn handle_request_ride(
        &self,
        conn_id: u64,
        passenger_id: UserId,
        origin: Coordinates,
        destination: Coordinates,
        price: u64,
        vehicle: VehicleClass,
    ) -> Vec<DispatchAction> {
        let created = self
            .lifecycle
            .create_ride(passenger_id, origin, destination, price, vehicle)
            .await;

        let (ride, passenger) = match created {
            Ok(created) => created,
            Err(error) => return self.reject(conn_id, None, &error),
        };

        // The requester follows their own ride without an explicit join
        self.rooms().join(conn_id, Group::Ride(ride.id.clone()));

        let ride_id = ride.id.clone();
        let ack = ServerMessage::RideCreated { ride: ride.clone() };
        let offer = broadcast::ride_created(ride, passenger);

        vec![
            DispatchAction::Send { conn_id, message: ack },
            to_broadcast(offer),
            log(LogLevel::Info, format!("ride {ride_id} created, offered to online drivers")),
        ]
    }

    async fn handle_accept(
        &self,
        conn_id: u64,
        ride_id: RideId,
        driver_id: UserId,
    ) -> Vec<DispatchAction> {
        // Only connections in the online-drivers group may accept
        if !self.rooms().is_member(conn_id, &Group::OnlineDrivers) {
            return vec![
                DispatchAction::Send {
                    conn_id,
                    message: ServerMessage::Rejection(Rejection::not_online(ride_id.clone())),
                },
                log(LogLevel::Warn, format!("accept for ride {ride_id} from offline connection")),
            ];
        }

        match self.lifecycle.accept_ride(&ride_id, &driver_id).await {
            Ok((session, driver)) => {
                // The winner follows the ride from here on
                self.rooms().join(conn_id, Group::Ride(session.id.clone()));

                vec![
                    to_broadcast(broadcast::ride_accepted(session.id.clone(), driver)),
                    log(
                        LogLevel::Info,
                        format!("ride {} accepted by driver {driver_id}", session.id),
                    ),
                ]
            },
            Err(error) => self.reject(conn_id, Some(&ride_id), &error),
        }
    }

    async fn handle_transition(
        &self,
        conn_id: u64,
        ride_id: RideId,
        step: Step,
    ) -> Vec<DispatchAction> {
        let result = match step {
            Step::Arrive => self.lifecycle.mark_arrived(&ride_id).await,
            Step::Start => self.lifecycle.start_trip(&ride_id).await,
        };

        match result {
            Ok(session) => vec![
                to_broadcast(broadcast::status_changed(session.id.clone(), session.status)),
                log(LogLevel::Info, format!("ride {} now {}", session.id, session.status)),
            ],
            Err(error) => self.reject(conn_id, Some(&ride_id), &error),
        }
    }

    async fn handle_finish(
        &self,
        conn_id: u64,
        ride_id: RideId,
        price: Option<u64>,
    ) -> Vec<DispatchAction> {
        match self.lifecycle.finish_trip(&ride_id, price).await {
            Ok((session, record)) => {
                let mut actions: Vec<DispatchAction> = broadcast::trip_finished(&session, record)
                    .into_iter()
                    .map(to_broadcast)
                    .collect();
                actions.push(log(
                    LogLevel::Info,
                    format!("ride {} completed at price {}", session.id, session.price),
                ));
                actions
            },
            Err(error) => self.reject(conn_id, Some(&ride_id), &error),
        }
    }

    fn handle_location(
        &self,
        conn_id: u64,
        ride_id: RideId,
        lat: f64,
        lng: f64,
    ) -> Vec<DispatchAction> {
        if let Some(rejection) = self.relay_guard(conn_id, &ride_id) {
            return rejection;
        }
        vec![to_broadcast(broadcast::location_update(ride_id, lat, lng))]
    }

    fn handle_chat(&self, conn_id: u64, relay: ChatRelay) -> Vec<DispatchAction> {
        if let Some(rejection) = self.relay_guard(conn_id, &relay.ride_id) {
            return rejection;
        }
        vec![to_broadcast(broadcast::chat_message(relay))]
    }

    /// Relays require the sender to be in the ride's room; anything else
    /// would let a non-participant inject or observe room traffic.
    fn relay_guard(&self, conn_id: u64, ride_id: &RideId) -> Option<Vec<DispatchAction>> {
        if self.rooms().is_member(conn_id, &Group::Ride(ride_id.clone())) {
            return None;
        }
        Some(vec![
            DispatchAction::Send {
                conn_id,
                message: ServerMessage::Rejection(Rejection::not_in_room(ride_id.clone())),
            },
            log(LogLevel::Warn, format!("relay for ride {ride_id} from non-member {conn_id}")),
        ])
    }

    fn handle_connection_closed(&self, conn_id: u64, reason: &str) -> Vec<DispatchAction> {
        let mut actions = Vec::new();

        if let Some(driver_id) = self.presence().mark_offline(conn_id) {
            self.rooms().leave(conn_id, &Group::OnlineDrivers);
            actions.push(log(LogLevel::Info, format!("driver {driver_id} offline (disconnect)")));
        }

        if let Some(groups) = self.rooms().leave_all(conn_id) {
            actions.push(log(
                LogLevel::Info,
                format!("connection {conn_id} closed: {reason}, was in {} groups", groups.len()),
            ));
        }

        actions
    }

    /// Report a failed action back to its initiator.
    ///
    /// A lost race is expected traffic and logged at debug; an exhausted
    /// store is logged at error; guard failures and unknown ids at warn.
    fn reject(
        &self,
        conn_id: u64,
        ride_id: Option<&RideId>,
        error: &LifecycleError,
    ) -> Vec<DispatchAction> {
        let rejection = match error {
            LifecycleError::RideNotFound(id) => Rejection::ride_not_found(id.clone()),
            LifecycleError::UnknownUser(id) => Rejection::unknown_user(id),
            LifecycleError::InvalidTransition { ride_id, from, attempted } => {
                Rejection::invalid_transition(ride_id.clone(), *from, *attempted)
            },
            LifecycleError::RaceLost(id) => Rejection::ride_taken(id.clone()),
            LifecycleError::InvalidPrice(id) => Rejection::invalid_price(id.clone()),
            LifecycleError::MissingDriver(id) => {
                Rejection::store_unavailable(Some(id.clone()), error.to_string())
            },
            LifecycleError::Unavailable(_) => {
                Rejection::store_unavailable(ride_id.cloned(), error.to_string())
            },
        };

        let level = match error {
            LifecycleError::RaceLost(_) => LogLevel::Debug,
            LifecycleError::Unavailable(_) | LifecycleError::MissingDriver(_) => LogLevel::Error,
            _ => LogLevel::Warn,
        };

        vec![
            DispatchAction::Send { conn_id, message: ServerMessage::Rejection(rejection) },
            log(level, format!("action rejected for connection {conn_id}: {error}")),
        ]
    }

    /// # Panics
    ///
    /// Panics if the router mutex is poisoned (a task panicked while
    /// holding it); the process is not recoverable at that point.
    #[allow(clippy::expect_used)]
    fn rooms(&self) -> MutexGuard<'_, RoomRouter> {
        self.rooms.lock().expect("RoomRouter mutex poisoned")
    }

    /// # Panics
    ///
    /// Panics if the presence mutex is poisoned; the process is not
    /// recoverable at that point.
    #[allow(clippy::expect_used)]
    fn presence(&self) -> MutexGuard<'_, PresenceRegistry> {
        self.presence.lock().expect("PresenceRegistry mutex poisoned")
    }
}

impl<E, S, D> std::fmt::Debug for DispatchDriver<E, S, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchDriver").field("config", &self.config).finish_non_exhaustive()
    }
}

/// Linear transitions sharing one handler.
enum Step {
    Arrive,
    Start,
}

fn to_broadcast(plan: Outbound) -> DispatchAction {
    DispatchAction::Broadcast { group: plan.group, message: plan.message, exclude: None }
}

fn log(level: LogLevel, message: String) -> DispatchAction {
    DispatchAction::Log { level, message }
}
