//! Ridewire production server.
//!
//! Realtime ride-dispatch server using Quinn for QUIC transport and Tokio
//! for the async runtime.
//!
//! # Architecture
//!
//! The [`DispatchDriver`] is pure logic: connection events in, actions
//! out. This crate provides the production glue that executes those
//! actions over real sockets:
//!
//! - [`DispatchDriver`]: event-to-actions dispatch coordinator
//! - [`RoomRouter`] / [`PresenceRegistry`]: process-wide membership state
//! - [`broadcast`]: audience planning for every outbound message
//! - [`Server`]: accept loop and action execution
//! - [`QuinnTransport`]: QUIC transport via the Quinn library
//! - [`SystemEnv`]: production environment (real time, crypto RNG)
//!
//! Outbound delivery is message-passing end to end: each connection owns
//! an unbounded channel drained by a writer task holding its QUIC stream,
//! so fan-out is channel writes and never iterates live sockets under a
//! lock.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod broadcast;
mod driver;
mod error;
mod presence;
mod rooms;
mod server_error;
mod system_env;
mod transport;

use std::{collections::HashMap, sync::Arc};

use bytes::Bytes;
pub use driver::{DispatchAction, DispatchConfig, DispatchDriver, DispatchEvent, LogLevel};
pub use error::ServerError;
pub use presence::PresenceRegistry;
use ridewire_core::{Environment, MemoryDirectory, MemoryRideStore, RideLifecycle};
use ridewire_proto::{ClientEvent, Rejection, ServerMessage, wire};
pub use rooms::{Group, RoomRouter};
pub use server_error::EngineError;
pub use system_env::SystemEnv;
use tokio::sync::{RwLock, mpsc};
pub use transport::{QuinnConnection, QuinnTransport};

/// Dispatch driver wired to the production environment and the in-memory
/// development backends.
pub type EngineDriver = DispatchDriver<SystemEnv, MemoryRideStore, MemoryDirectory>;

/// Shared per-connection runtime state.
///
/// Holds the connection map (for closing) and the outbound channel map.
/// All messages to a client flow through its single channel and writer
/// task, which preserves per-connection ordering.
struct SharedState {
    /// Connection id → QUIC connection (for closing)
    connections: RwLock<HashMap<u64, QuinnConnection>>,
    /// Connection id → outbound frame channel
    outbound: RwLock<HashMap<u64, mpsc::UnboundedSender<Bytes>>>,
}

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:4433")
    pub bind_address: String,
    /// Path to TLS certificate (PEM format)
    pub cert_path: Option<String>,
    /// Path to TLS private key (PEM format)
    pub key_path: Option<String>,
    /// Dispatch configuration (connection limits)
    pub dispatch: DispatchConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4433".to_string(),
            cert_path: None,
            key_path: None,
            dispatch: DispatchConfig::default(),
        }
    }
}

/// Production Ridewire server.
///
/// Wraps the dispatch driver with Quinn QUIC transport and the system
/// environment. The ride store and user directory are the in-memory
/// development backends; a deployment swaps them by wiring its own
/// [`DispatchDriver`].
pub struct Server {
    driver: EngineDriver,
    directory: MemoryDirectory,
    transport: QuinnTransport,
    env: SystemEnv,
}

impl Server {
    /// Create and bind a new server.
    pub fn bind(config: RuntimeConfig) -> Result<Self, ServerError> {
        let env = SystemEnv::new();
        let store = MemoryRideStore::new();
        let directory = MemoryDirectory::new();
        let lifecycle = RideLifecycle::new(env.clone(), store, directory.clone());
        let driver = DispatchDriver::new(lifecycle, config.dispatch);

        let transport =
            QuinnTransport::bind(&config.bind_address, config.cert_path, config.key_path)?;

        Ok(Self { driver, directory, transport, env })
    }

    /// The user directory backing this server, for seeding profiles.
    pub fn directory(&self) -> &MemoryDirectory {
        &self.directory
    }

    /// Run the server, accepting connections and processing events.
    ///
    /// Runs until the process is shut down or the endpoint fails.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("Server starting on {}", self.transport.local_addr()?);

        let env = self.env;
        let driver = self.driver;
        let shared = Arc::new(SharedState {
            connections: RwLock::new(HashMap::new()),
            outbound: RwLock::new(HashMap::new()),
        });

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let driver = driver.clone();
                    let shared = Arc::clone(&shared);
                    let env = env.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, driver, shared, env).await {
                            tracing::error!("Connection error: {}", e);
                        }
                    });
                },
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                },
            }
        }
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        self.transport.local_addr()
    }
}

/// Handle a single QUIC connection from accept to teardown.
async fn handle_connection(
    conn: QuinnConnection,
    driver: EngineDriver,
    shared: Arc<SharedState>,
    env: SystemEnv,
) -> Result<(), ServerError> {
    let conn_id = env.random_u64();
    tracing::debug!("New connection {} from {}", conn_id, conn.remote_addr());

    let mut outbound_stream = conn.open_uni().await?;
    let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();

    {
        let mut connections = shared.connections.write().await;
        connections.insert(conn_id, conn.clone());
    }

    {
        let mut outbound = shared.outbound.write().await;
        outbound.insert(conn_id, tx);
    }

    // Writer task: sole owner of the outbound stream. Dropping the sender
    // on teardown ends it.
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = outbound_stream.write_all(&frame).await {
                tracing::debug!("outbound write failed for {}: {}", conn_id, e);
                break;
            }
        }
    });

    let started = env.now();

    match driver.process_event(DispatchEvent::ConnectionOpened { conn_id }).await {
        Ok(actions) => execute_actions(&driver, actions, &shared).await,
        Err(e) => tracing::warn!("connection {} not admitted: {}", conn_id, e),
    }

    loop {
        match conn.accept_uni().await {
            Ok(recv) => {
                let driver = driver.clone();
                let shared = Arc::clone(&shared);

                tokio::spawn(async move {
                    handle_stream(conn_id, recv, driver, shared).await;
                });
            },
            Err(e) => {
                tracing::debug!("Connection {} closed: {}", conn_id, e);
                break;
            },
        }
    }

    {
        let mut connections = shared.connections.write().await;
        connections.remove(&conn_id);
    }

    {
        let mut outbound = shared.outbound.write().await;
        outbound.remove(&conn_id);
    }

    match driver
        .process_event(DispatchEvent::ConnectionClosed {
            conn_id,
            reason: "connection closed".to_string(),
        })
        .await
    {
        Ok(actions) => execute_actions(&driver, actions, &shared).await,
        Err(e) => tracing::warn!("teardown for connection {} failed: {}", conn_id, e),
    }

    tracing::debug!("connection {} lived {:?}", conn_id, env.now() - started);

    Ok(())
}

/// Read length-prefixed client events from one inbound stream.
///
/// One task per stream: a slow event on one stream never stalls another
/// connection, and a malformed frame only costs its own stream.
async fn handle_stream(
    conn_id: u64,
    mut recv: quinn::RecvStream,
    driver: EngineDriver,
    shared: Arc<SharedState>,
) {
    loop {
        let mut prefix = [0u8; wire::LEN_PREFIX_SIZE];
        if recv.read_exact(&mut prefix).await.is_err() {
            // EOF or reset; normal end of stream
            break;
        }

        let len = match wire::body_len(prefix) {
            Ok(len) => len,
            Err(e) => {
                tracing::warn!("connection {}: {}", conn_id, e);
                break;
            },
        };

        let mut body = vec![0u8; len];
        if recv.read_exact(&mut body).await.is_err() {
            tracing::debug!("connection {}: truncated frame", conn_id);
            break;
        }

        let event: ClientEvent = match wire::decode(&body) {
            Ok(event) => event,
            Err(e) => {
                let rejection =
                    ServerMessage::Rejection(Rejection::invalid_payload(e.to_string()));
                send_to(&shared, conn_id, &rejection).await;
                tracing::warn!("connection {} sent undecodable event: {}", conn_id, e);
                continue;
            },
        };

        match driver.process_event(DispatchEvent::EventReceived { conn_id, event }).await {
            Ok(actions) => execute_actions(&driver, actions, &shared).await,
            Err(e) => {
                tracing::warn!("connection {}: event dropped: {}", conn_id, e);
                break;
            },
        }
    }
}

/// Execute dispatch actions against the live connection state.
async fn execute_actions(driver: &EngineDriver, actions: Vec<DispatchAction>, shared: &SharedState) {
    for action in actions {
        match action {
            DispatchAction::Send { conn_id, message } => {
                send_to(shared, conn_id, &message).await;
            },

            DispatchAction::Broadcast { group, message, exclude } => {
                let members = driver.group_members(&group);

                let frame = match wire::encode(&message) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::error!("failed to encode {}: {}", message.topic(), e);
                        continue;
                    },
                };

                let outbound = shared.outbound.read().await;
                for member in members {
                    if Some(member) == exclude {
                        continue;
                    }
                    if let Some(sender) = outbound.get(&member) {
                        // A closed receiver means the connection is
                        // tearing down; the router purge is in flight
                        let _ = sender.send(frame.clone());
                    }
                }
            },

            DispatchAction::Close { conn_id, reason } => {
                tracing::info!("Closing connection {}: {}", conn_id, reason);
                let mut connections = shared.connections.write().await;
                if let Some(conn) = connections.remove(&conn_id) {
                    conn.close(0u32.into(), reason.as_bytes());
                }
            },

            DispatchAction::Log { level, message } => match level {
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
        }
    }
}

/// Queue a message for one connection's writer task.
async fn send_to(shared: &SharedState, conn_id: u64, message: &ServerMessage) {
    let frame = match wire::encode(message) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::error!("failed to encode {}: {}", message.topic(), e);
            return;
        },
    };

    let outbound = shared.outbound.read().await;
    if let Some(sender) = outbound.get(&conn_id) {
        let _ = sender.send(frame);
    } else {
        tracing::debug!("send: connection {} not found", conn_id);
    }
}
