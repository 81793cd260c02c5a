//! Dispatch flow behavior tests.
//!
//! Drives the dispatch coordinator through whole scenarios and checks the
//! observable contract: who hears about what, in which order, and what the
//! initiator gets back when an action is refused.

use std::time::Duration;

use ridewire_core::{
    Environment, MemoryDirectory, MemoryRideStore, RideLifecycle, UserProfile, VehicleInfo,
};
use ridewire_proto::{
    ClientEvent, Coordinates, Rejection, RideId, RideStatus, ServerMessage, UserId, VehicleClass,
};
use ridewire_server::{
    DispatchAction, DispatchConfig, DispatchDriver, DispatchEvent, Group, LogLevel,
};

// Test environment using system RNG and a fixed wall clock
#[derive(Clone)]
struct TestEnv;

impl Environment for TestEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        use rand::RngCore;
        rand::thread_rng().fill_bytes(buffer);
    }

    fn wall_clock_secs(&self) -> u64 {
        1_700_000_000
    }
}

type TestDriver = DispatchDriver<TestEnv, MemoryRideStore, MemoryDirectory>;

const PASSENGER_CONN: u64 = 1;
const DRIVER_CONN: u64 = 2;
const OTHER_DRIVER_CONN: u64 = 3;
const BYSTANDER_CONN: u64 = 4;

const ORIGIN: Coordinates = Coordinates { lat: 14.6928, lng: -17.4467 };
const DEST: Coordinates = Coordinates { lat: 14.7167, lng: -17.4677 };

fn profile(id: &str, name: &str, vehicle: Option<VehicleInfo>) -> UserProfile {
    UserProfile {
        id: UserId::new(id),
        name: name.to_string(),
        phone: format!("+2217700000{id}"),
        rating: 4.9,
        vehicle,
    }
}

fn test_driver() -> TestDriver {
    let directory = MemoryDirectory::new();
    directory.insert(profile("p1", "Awa", None));
    directory.insert(profile(
        "d1",
        "Moussa",
        Some(VehicleInfo {
            make: "Yamaha".to_string(),
            model: "NMAX".to_string(),
            color: "Black".to_string(),
            license_plate: "DK-1234-AB".to_string(),
        }),
    ));
    directory.insert(profile("d2", "Ibrahima", None));

    let lifecycle = RideLifecycle::new(TestEnv, MemoryRideStore::new(), directory);
    DispatchDriver::new(lifecycle, DispatchConfig::default())
}

async fn open(driver: &TestDriver, conn_id: u64) {
    driver.process_event(DispatchEvent::ConnectionOpened { conn_id }).await.unwrap();
}

async fn send(driver: &TestDriver, conn_id: u64, event: ClientEvent) -> Vec<DispatchAction> {
    driver.process_event(DispatchEvent::EventReceived { conn_id, event }).await.unwrap()
}

/// Standard stage: passenger and two drivers connected, both drivers
/// online, plus a bystander connection that joined nothing.
async fn stage(driver: &TestDriver) {
    for conn in [PASSENGER_CONN, DRIVER_CONN, OTHER_DRIVER_CONN, BYSTANDER_CONN] {
        open(driver, conn).await;
    }
    send(driver, DRIVER_CONN, ClientEvent::DriverOnline { driver_id: UserId::new("d1") }).await;
    send(driver, OTHER_DRIVER_CONN, ClientEvent::DriverOnline { driver_id: UserId::new("d2") })
        .await;
}

async fn create_ride(driver: &TestDriver, price: u64) -> RideId {
    let actions = send(
        driver,
        PASSENGER_CONN,
        ClientEvent::RequestRide {
            passenger_id: UserId::new("p1"),
            origin: ORIGIN,
            destination: DEST,
            price,
            vehicle: VehicleClass::Moto,
        },
    )
    .await;

    actions
        .iter()
        .find_map(|action| match action {
            DispatchAction::Send {
                message: ServerMessage::RideCreated { ride }, ..
            } => Some(ride.id.clone()),
            _ => None,
        })
        .expect("ride creation acknowledges the requester")
}

fn broadcasts(actions: &[DispatchAction]) -> Vec<(Group, ServerMessage)> {
    actions
        .iter()
        .filter_map(|action| match action {
            DispatchAction::Broadcast { group, message, .. } => {
                Some((group.clone(), message.clone()))
            },
            _ => None,
        })
        .collect()
}

fn rejections_to(actions: &[DispatchAction], conn_id: u64) -> Vec<Rejection> {
    actions
        .iter()
        .filter_map(|action| match action {
            DispatchAction::Send { conn_id: target, message: ServerMessage::Rejection(r) }
                if *target == conn_id =>
            {
                Some(r.clone())
            },
            _ => None,
        })
        .collect()
}

fn has_log_at(actions: &[DispatchAction], level: LogLevel) -> bool {
    actions
        .iter()
        .any(|action| matches!(action, DispatchAction::Log { level: l, .. } if *l == level))
}

#[tokio::test]
async fn new_ride_is_offered_to_online_drivers_only() {
    let driver = test_driver();
    stage(&driver).await;

    let actions = send(
        &driver,
        PASSENGER_CONN,
        ClientEvent::RequestRide {
            passenger_id: UserId::new("p1"),
            origin: ORIGIN,
            destination: DEST,
            price: 500,
            vehicle: VehicleClass::Moto,
        },
    )
    .await;

    let plans = broadcasts(&actions);
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].0, Group::OnlineDrivers);
    assert!(matches!(plans[0].1, ServerMessage::NewRide(_)));

    // The offer's audience is exactly the two online drivers
    let mut audience = driver.group_members(&Group::OnlineDrivers);
    audience.sort_unstable();
    assert_eq!(audience, vec![DRIVER_CONN, OTHER_DRIVER_CONN]);
}

#[tokio::test]
async fn requester_follows_their_ride_without_explicit_join() {
    let driver = test_driver();
    stage(&driver).await;

    let ride_id = create_ride(&driver, 500).await;
    assert!(driver.group_members(&Group::Ride(ride_id)).contains(&PASSENGER_CONN));
}

#[tokio::test]
async fn accept_notifies_the_room_with_driver_identity() {
    let driver = test_driver();
    stage(&driver).await;
    let ride_id = create_ride(&driver, 500).await;

    let actions = send(
        &driver,
        DRIVER_CONN,
        ClientEvent::AcceptRide { ride_id: ride_id.clone(), driver_id: UserId::new("d1") },
    )
    .await;

    let plans = broadcasts(&actions);
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].0, Group::Ride(ride_id.clone()));

    let ServerMessage::RideStatus(update) = &plans[0].1 else {
        unreachable!("acceptance broadcasts a status update");
    };
    assert_eq!(update.status, RideStatus::Accepted);
    let winner = update.driver.as_ref().unwrap();
    assert_eq!(winner.name, "Moussa");
    assert_eq!(winner.vehicle_info, "Yamaha NMAX • Black");

    // The winner joined the ride room
    let members = driver.group_members(&Group::Ride(ride_id));
    assert!(members.contains(&DRIVER_CONN));
    assert!(members.contains(&PASSENGER_CONN));
}

#[tokio::test]
async fn losing_driver_gets_a_rejection_and_no_status_event() {
    let driver = test_driver();
    stage(&driver).await;
    let ride_id = create_ride(&driver, 500).await;

    send(
        &driver,
        DRIVER_CONN,
        ClientEvent::AcceptRide { ride_id: ride_id.clone(), driver_id: UserId::new("d1") },
    )
    .await;

    let actions = send(
        &driver,
        OTHER_DRIVER_CONN,
        ClientEvent::AcceptRide { ride_id: ride_id.clone(), driver_id: UserId::new("d2") },
    )
    .await;

    assert!(broadcasts(&actions).is_empty(), "no ride_status for the loser");

    let rejections = rejections_to(&actions, OTHER_DRIVER_CONN);
    assert_eq!(rejections.len(), 1);
    assert_eq!(rejections[0].code, Rejection::RIDE_TAKEN);

    // A lost race is expected traffic, never an error log
    assert!(!has_log_at(&actions, LogLevel::Error));
    assert!(!has_log_at(&actions, LogLevel::Warn));
    assert!(has_log_at(&actions, LogLevel::Debug));

    // The loser never joined the room
    assert!(!driver.group_members(&Group::Ride(ride_id)).contains(&OTHER_DRIVER_CONN));
}

#[tokio::test]
async fn concurrent_accepts_produce_exactly_one_winner() {
    let driver = test_driver();
    stage(&driver).await;
    let ride_id = create_ride(&driver, 500).await;

    let a = driver.clone();
    let b = driver.clone();
    let ride_a = ride_id.clone();
    let ride_b = ride_id.clone();

    let (first, second) = tokio::join!(
        tokio::spawn(async move {
            a.process_event(DispatchEvent::EventReceived {
                conn_id: DRIVER_CONN,
                event: ClientEvent::AcceptRide { ride_id: ride_a, driver_id: UserId::new("d1") },
            })
            .await
        }),
        tokio::spawn(async move {
            b.process_event(DispatchEvent::EventReceived {
                conn_id: OTHER_DRIVER_CONN,
                event: ClientEvent::AcceptRide { ride_id: ride_b, driver_id: UserId::new("d2") },
            })
            .await
        }),
    );
    let first = first.unwrap().unwrap();
    let second = second.unwrap().unwrap();

    let status_events = broadcasts(&first).len() + broadcasts(&second).len();
    assert_eq!(status_events, 1, "exactly one acceptance is announced");

    let losses = rejections_to(&first, DRIVER_CONN).len()
        + rejections_to(&second, OTHER_DRIVER_CONN).len();
    assert_eq!(losses, 1, "exactly one driver is told the ride is taken");
}

#[tokio::test]
async fn accept_requires_online_drivers_membership() {
    let driver = test_driver();
    stage(&driver).await;
    let ride_id = create_ride(&driver, 500).await;

    let actions = send(
        &driver,
        BYSTANDER_CONN,
        ClientEvent::AcceptRide { ride_id: ride_id.clone(), driver_id: UserId::new("d1") },
    )
    .await;

    assert!(broadcasts(&actions).is_empty());
    let rejections = rejections_to(&actions, BYSTANDER_CONN);
    assert_eq!(rejections.len(), 1);
    assert_eq!(rejections[0].code, Rejection::NOT_ONLINE);

    // The ride is untouched and still acceptable
    let actions = send(
        &driver,
        DRIVER_CONN,
        ClientEvent::AcceptRide { ride_id, driver_id: UserId::new("d1") },
    )
    .await;
    assert_eq!(broadcasts(&actions).len(), 1);
}

#[tokio::test]
async fn room_observes_statuses_in_order_with_no_repeats_or_skips() {
    let driver = test_driver();
    stage(&driver).await;
    let ride_id = create_ride(&driver, 500).await;

    let mut observed = Vec::new();
    let flow = [
        ClientEvent::AcceptRide { ride_id: ride_id.clone(), driver_id: UserId::new("d1") },
        ClientEvent::DriverArrived { ride_id: ride_id.clone() },
        ClientEvent::StartTrip { ride_id: ride_id.clone() },
        ClientEvent::FinishTrip { ride_id: ride_id.clone(), price: None },
    ];

    for event in flow {
        let actions = send(&driver, DRIVER_CONN, event).await;
        for (group, message) in broadcasts(&actions) {
            if group == Group::Ride(ride_id.clone()) {
                if let ServerMessage::RideStatus(update) = message {
                    observed.push(update.status);
                }
            }
        }
    }

    assert_eq!(
        observed,
        vec![
            RideStatus::Accepted,
            RideStatus::Arrived,
            RideStatus::InProgress,
            RideStatus::Completed
        ]
    );

    // A repeated transition is refused and announces nothing
    let actions =
        send(&driver, DRIVER_CONN, ClientEvent::DriverArrived { ride_id: ride_id.clone() }).await;
    assert!(broadcasts(&actions).is_empty());
    let rejections = rejections_to(&actions, DRIVER_CONN);
    assert_eq!(rejections[0].code, Rejection::INVALID_TRANSITION);
}

#[tokio::test]
async fn finish_emits_one_room_message_and_one_global_record() {
    let driver = test_driver();
    stage(&driver).await;
    let ride_id = create_ride(&driver, 500).await;

    send(
        &driver,
        DRIVER_CONN,
        ClientEvent::AcceptRide { ride_id: ride_id.clone(), driver_id: UserId::new("d1") },
    )
    .await;
    send(&driver, DRIVER_CONN, ClientEvent::DriverArrived { ride_id: ride_id.clone() }).await;
    send(&driver, DRIVER_CONN, ClientEvent::StartTrip { ride_id: ride_id.clone() }).await;

    let actions = send(
        &driver,
        DRIVER_CONN,
        ClientEvent::FinishTrip { ride_id: ride_id.clone(), price: Some(650) },
    )
    .await;

    let plans = broadcasts(&actions);
    assert_eq!(plans.len(), 2);

    assert_eq!(plans[0].0, Group::Ride(ride_id.clone()));
    let ServerMessage::RideStatus(update) = &plans[0].1 else {
        unreachable!("room hears the final status");
    };
    assert_eq!(update.status, RideStatus::Completed);
    assert_eq!(update.final_price, Some(650));

    assert_eq!(plans[1].0, Group::All);
    let ServerMessage::TripFinished(record) = &plans[1].1 else {
        unreachable!("everyone hears the enriched record");
    };
    assert_eq!(record.final_price, 650);
    assert_eq!(record.vehicle, VehicleClass::Moto);
    assert_eq!(record.passenger.name, "Awa");
    assert_eq!(record.driver.name, "Moussa");
    assert_eq!(record.created_at_secs, 1_700_000_000);
}

#[tokio::test]
async fn relays_reach_the_room_and_only_the_room() {
    let driver = test_driver();
    stage(&driver).await;
    let ride_id = create_ride(&driver, 500).await;

    send(
        &driver,
        DRIVER_CONN,
        ClientEvent::AcceptRide { ride_id: ride_id.clone(), driver_id: UserId::new("d1") },
    )
    .await;

    let actions = send(
        &driver,
        DRIVER_CONN,
        ClientEvent::UpdateLocation { ride_id: ride_id.clone(), lat: 14.70, lng: -17.45 },
    )
    .await;

    let plans = broadcasts(&actions);
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].0, Group::Ride(ride_id.clone()));
    assert!(matches!(plans[0].1, ServerMessage::DriverLocation { .. }));

    // The room's membership excludes everyone who never joined
    let members = driver.group_members(&Group::Ride(ride_id));
    assert!(!members.contains(&BYSTANDER_CONN));
    assert!(!members.contains(&OTHER_DRIVER_CONN));
}

#[tokio::test]
async fn relays_from_non_members_are_refused() {
    let driver = test_driver();
    stage(&driver).await;
    let ride_id = create_ride(&driver, 500).await;

    let actions = send(
        &driver,
        BYSTANDER_CONN,
        ClientEvent::UpdateLocation { ride_id: ride_id.clone(), lat: 0.0, lng: 0.0 },
    )
    .await;
    assert!(broadcasts(&actions).is_empty());
    assert_eq!(rejections_to(&actions, BYSTANDER_CONN)[0].code, Rejection::NOT_IN_ROOM);

    let actions = send(
        &driver,
        BYSTANDER_CONN,
        ClientEvent::ChatMessage {
            ride_id,
            sender_id: UserId::new("p1"),
            message: "can I come too".to_string(),
            timestamp: "t".to_string(),
        },
    )
    .await;
    assert!(broadcasts(&actions).is_empty());
    assert_eq!(rejections_to(&actions, BYSTANDER_CONN)[0].code, Rejection::NOT_IN_ROOM);
}

#[tokio::test]
async fn chat_is_relayed_verbatim_to_the_room() {
    let driver = test_driver();
    stage(&driver).await;
    let ride_id = create_ride(&driver, 500).await;

    let actions = send(
        &driver,
        PASSENGER_CONN,
        ClientEvent::ChatMessage {
            ride_id: ride_id.clone(),
            sender_id: UserId::new("p1"),
            message: "j'arrive".to_string(),
            timestamp: "2026-08-07T10:15:00Z".to_string(),
        },
    )
    .await;

    let plans = broadcasts(&actions);
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].0, Group::Ride(ride_id));
    let ServerMessage::Chat(chat) = &plans[0].1 else {
        unreachable!("chat relays as a chat message");
    };
    assert_eq!(chat.message, "j'arrive");
    assert_eq!(chat.timestamp, "2026-08-07T10:15:00Z");
}

#[tokio::test]
async fn disconnect_purges_presence_and_rooms_exactly_once() {
    let driver = test_driver();
    stage(&driver).await;
    let ride_id = create_ride(&driver, 500).await;

    send(
        &driver,
        DRIVER_CONN,
        ClientEvent::AcceptRide { ride_id: ride_id.clone(), driver_id: UserId::new("d1") },
    )
    .await;
    assert!(driver.group_members(&Group::Ride(ride_id.clone())).contains(&DRIVER_CONN));
    assert!(driver.group_members(&Group::OnlineDrivers).contains(&DRIVER_CONN));

    driver
        .process_event(DispatchEvent::ConnectionClosed {
            conn_id: DRIVER_CONN,
            reason: "peer left".to_string(),
        })
        .await
        .unwrap();

    // Subsequent fan-out to either group cannot reach the connection
    assert!(!driver.group_members(&Group::Ride(ride_id.clone())).contains(&DRIVER_CONN));
    assert!(!driver.group_members(&Group::OnlineDrivers).contains(&DRIVER_CONN));
    assert!(!driver.group_members(&Group::All).contains(&DRIVER_CONN));

    // Teardown is idempotent
    let actions = driver
        .process_event(DispatchEvent::ConnectionClosed {
            conn_id: DRIVER_CONN,
            reason: "peer left".to_string(),
        })
        .await
        .unwrap();
    assert!(actions.is_empty());

    // Events from the dead connection are unroutable
    let result = driver
        .process_event(DispatchEvent::EventReceived {
            conn_id: DRIVER_CONN,
            event: ClientEvent::DriverArrived { ride_id },
        })
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn driver_offline_event_leaves_the_dispatch_pool() {
    let driver = test_driver();
    stage(&driver).await;

    let actions =
        send(&driver, DRIVER_CONN, ClientEvent::DriverOffline { driver_id: UserId::new("d1") })
            .await;
    assert!(has_log_at(&actions, LogLevel::Info));
    assert!(!driver.group_members(&Group::OnlineDrivers).contains(&DRIVER_CONN));

    // Going offline twice is a no-op
    let actions =
        send(&driver, DRIVER_CONN, ClientEvent::DriverOffline { driver_id: UserId::new("d1") })
            .await;
    assert!(has_log_at(&actions, LogLevel::Debug));
}

#[tokio::test]
async fn unknown_ride_and_unknown_driver_are_reported() {
    let driver = test_driver();
    stage(&driver).await;

    let actions = send(
        &driver,
        DRIVER_CONN,
        ClientEvent::AcceptRide { ride_id: RideId::new("no-such"), driver_id: UserId::new("d1") },
    )
    .await;
    assert_eq!(rejections_to(&actions, DRIVER_CONN)[0].code, Rejection::RIDE_NOT_FOUND);

    let ride_id = create_ride(&driver, 500).await;
    let actions = send(
        &driver,
        DRIVER_CONN,
        ClientEvent::AcceptRide { ride_id, driver_id: UserId::new("ghost") },
    )
    .await;
    assert_eq!(rejections_to(&actions, DRIVER_CONN)[0].code, Rejection::UNKNOWN_USER);
}

#[tokio::test]
async fn connection_limit_closes_excess_connections() {
    let directory = MemoryDirectory::new();
    directory.insert(profile("p1", "Awa", None));
    let lifecycle = RideLifecycle::new(TestEnv, MemoryRideStore::new(), directory);
    let driver = DispatchDriver::new(lifecycle, DispatchConfig { max_connections: 2 });

    open(&driver, 1).await;
    open(&driver, 2).await;

    let actions = driver.process_event(DispatchEvent::ConnectionOpened { conn_id: 3 }).await.unwrap();
    assert!(matches!(actions[0], DispatchAction::Close { conn_id: 3, .. }));
    assert_eq!(driver.connection_count(), 2);
}

#[tokio::test]
async fn cancellation_notifies_the_room() {
    let driver = test_driver();
    stage(&driver).await;
    let ride_id = create_ride(&driver, 500).await;

    let actions = driver.cancel_ride(&ride_id).await.unwrap();
    let plans = broadcasts(&actions);
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].0, Group::Ride(ride_id.clone()));
    let ServerMessage::RideStatus(update) = &plans[0].1 else {
        unreachable!("cancellation broadcasts a status update");
    };
    assert_eq!(update.status, RideStatus::Cancelled);

    // A cancelled ride can no longer be accepted
    let actions = send(
        &driver,
        DRIVER_CONN,
        ClientEvent::AcceptRide { ride_id, driver_id: UserId::new("d1") },
    )
    .await;
    assert_eq!(rejections_to(&actions, DRIVER_CONN)[0].code, Rejection::RIDE_TAKEN);
}
