//! Presence registry: which drivers are reachable for dispatch.
//!
//! Bidirectional driver ↔ connection map. Process-local and rebuilt from
//! zero on restart; nothing here is persisted. The matching online-drivers
//! group membership is maintained by the dispatch driver, which pairs
//! every presence mutation with the corresponding router operation.

use std::collections::HashMap;

use ridewire_proto::UserId;

/// Tracks drivers currently marked reachable, each tied to one live
/// connection.
///
/// # Invariants
///
/// - A presence entry never outlives its connection: disconnect purges it
///   exactly once, and purging an unknown connection is a no-op.
/// - One connection per driver: a driver reconnecting replaces the stale
///   entry (new connection wins), and the displaced connection id is
///   reported so the caller can detach it from the broadcast group.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    /// Driver → live connection
    by_driver: HashMap<UserId, u64>,
    /// Connection → driver (reverse index)
    by_connection: HashMap<u64, UserId>,
}

impl PresenceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a driver reachable on a connection.
    ///
    /// Returns the displaced connection id if the driver was already
    /// online elsewhere. Marking the same driver on the same connection
    /// again is a no-op.
    pub fn mark_online(&mut self, driver_id: UserId, conn_id: u64) -> Option<u64> {
        // A connection can represent at most one driver
        if let Some(previous_driver) = self.by_connection.get(&conn_id).cloned() {
            if previous_driver != driver_id {
                self.by_driver.remove(&previous_driver);
            }
        }

        let displaced = match self.by_driver.insert(driver_id.clone(), conn_id) {
            Some(old_conn) if old_conn != conn_id => {
                self.by_connection.remove(&old_conn);
                Some(old_conn)
            },
            _ => None,
        };

        self.by_connection.insert(conn_id, driver_id);
        displaced
    }

    /// Purge presence for a connection. Idempotent.
    ///
    /// Returns the driver that was online on it, if any.
    pub fn mark_offline(&mut self, conn_id: u64) -> Option<UserId> {
        let driver_id = self.by_connection.remove(&conn_id)?;
        self.by_driver.remove(&driver_id);
        Some(driver_id)
    }

    /// Purge presence for a driver. Idempotent.
    ///
    /// Returns the connection the driver was online on, if any.
    pub fn mark_offline_driver(&mut self, driver_id: &UserId) -> Option<u64> {
        let conn_id = self.by_driver.remove(driver_id)?;
        self.by_connection.remove(&conn_id);
        Some(conn_id)
    }

    /// Whether a driver is currently reachable.
    pub fn is_online(&self, driver_id: &UserId) -> bool {
        self.by_driver.contains_key(driver_id)
    }

    /// Number of drivers currently online.
    pub fn online_count(&self) -> usize {
        self.by_driver.len()
    }
}
