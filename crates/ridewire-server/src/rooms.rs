//! Room router: connection-to-group membership tracking.
//!
//! Maintains bidirectional mappings: group → connections (for fan-out) and
//! connection → groups (for teardown on disconnect). This gives O(1)
//! lookups in both directions and guarantees `leave_all` removes every
//! trace of a connection, so no broadcast can reach a dead socket.
//!
//! `broadcast-all` is implicit: every registered connection is always
//! reachable through it without joining anything.

use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use ridewire_proto::RideId;

/// A logical broadcast group.
///
/// Identifiers are opaque strings on the wire and in logs; the `Display`
/// impl produces them (`ride_<id>`, `online-drivers`, `broadcast-all`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Group {
    /// One ride's participants.
    Ride(RideId),
    /// Every driver currently marked reachable for dispatch.
    OnlineDrivers,
    /// Every registered connection. Implicit; never joined explicitly.
    All,
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ride(ride_id) => write!(f, "ride_{ride_id}"),
            Self::OnlineDrivers => f.write_str("online-drivers"),
            Self::All => f.write_str("broadcast-all"),
        }
    }
}

/// Tracks which connections belong to which broadcast groups.
///
/// # Invariants
///
/// - A membership entry never outlives its connection: `leave_all`
///   removes the connection from every group and unregisters it.
/// - Joining an already-joined group is idempotent.
/// - Empty explicit groups are pruned.
#[derive(Debug, Default)]
pub struct RoomRouter {
    /// Registered connections; the implicit broadcast-all membership
    connections: HashSet<u64>,
    /// Group → member connections
    group_members: HashMap<Group, HashSet<u64>>,
    /// Connection → joined groups
    memberships: HashMap<u64, HashSet<Group>>,
}

impl RoomRouter {
    /// Create an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Returns `false` if it is already known.
    pub fn register(&mut self, conn_id: u64) -> bool {
        if !self.connections.insert(conn_id) {
            return false;
        }
        self.memberships.insert(conn_id, HashSet::new());
        true
    }

    /// Whether a connection is registered.
    pub fn is_registered(&self, conn_id: u64) -> bool {
        self.connections.contains(&conn_id)
    }

    /// Join a connection to a group. Idempotent.
    ///
    /// Returns `false` if the connection is not registered. Joining
    /// `Group::All` is a no-op: registration already covers it.
    pub fn join(&mut self, conn_id: u64, group: Group) -> bool {
        if !self.connections.contains(&conn_id) {
            return false;
        }
        if group == Group::All {
            return true;
        }

        self.group_members.entry(group.clone()).or_default().insert(conn_id);
        self.memberships.entry(conn_id).or_default().insert(group);
        true
    }

    /// Remove a connection from a group.
    ///
    /// Returns `true` if the connection was a member. Leaving a group the
    /// connection never joined is a no-op.
    pub fn leave(&mut self, conn_id: u64, group: &Group) -> bool {
        let removed_from_group =
            self.group_members.get_mut(group).is_some_and(|members| members.remove(&conn_id));

        let removed_from_conn =
            self.memberships.get_mut(&conn_id).is_some_and(|groups| groups.remove(group));

        if self.group_members.get(group).is_some_and(HashSet::is_empty) {
            self.group_members.remove(group);
        }

        removed_from_group && removed_from_conn
    }

    /// Unregister a connection and remove every membership it held.
    ///
    /// Returns the groups it was in, or `None` if the connection was
    /// never registered (idempotent disconnect handling).
    pub fn leave_all(&mut self, conn_id: u64) -> Option<HashSet<Group>> {
        if !self.connections.remove(&conn_id) {
            return None;
        }
        let groups = self.memberships.remove(&conn_id).unwrap_or_default();

        for group in &groups {
            if let Some(members) = self.group_members.get_mut(group) {
                members.remove(&conn_id);
                if members.is_empty() {
                    self.group_members.remove(group);
                }
            }
        }

        Some(groups)
    }

    /// Whether a connection belongs to a group.
    ///
    /// Every registered connection belongs to `Group::All`.
    pub fn is_member(&self, conn_id: u64, group: &Group) -> bool {
        if *group == Group::All {
            return self.connections.contains(&conn_id);
        }
        self.group_members.get(group).is_some_and(|members| members.contains(&conn_id))
    }

    /// Snapshot of the connections in a group.
    ///
    /// Fan-out iterates the snapshot after the router lock is released,
    /// so sends never happen under this structure's lock.
    pub fn members_of(&self, group: &Group) -> Vec<u64> {
        if *group == Group::All {
            return self.connections.iter().copied().collect();
        }
        self.group_members.get(group).map(|members| members.iter().copied().collect()).unwrap_or_default()
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of members in a group.
    pub fn member_count(&self, group: &Group) -> usize {
        if *group == Group::All {
            return self.connections.len();
        }
        self.group_members.get(group).map_or(0, HashSet::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ride(id: &str) -> Group {
        Group::Ride(RideId::new(id))
    }

    #[test]
    fn group_ids_are_opaque_strings() {
        assert_eq!(ride("abc").to_string(), "ride_abc");
        assert_eq!(Group::OnlineDrivers.to_string(), "online-drivers");
        assert_eq!(Group::All.to_string(), "broadcast-all");
    }

    #[test]
    fn register_and_join() {
        let mut router = RoomRouter::new();

        assert!(router.register(1));
        assert!(!router.register(1));

        assert!(router.join(1, ride("r1")));
        assert!(router.is_member(1, &ride("r1")));
        assert_eq!(router.members_of(&ride("r1")), vec![1]);
    }

    #[test]
    fn join_unregistered_connection_fails() {
        let mut router = RoomRouter::new();
        assert!(!router.join(999, ride("r1")));
        assert!(router.members_of(&ride("r1")).is_empty());
    }

    #[test]
    fn join_is_idempotent() {
        let mut router = RoomRouter::new();
        router.register(1);

        assert!(router.join(1, ride("r1")));
        assert!(router.join(1, ride("r1")));
        assert_eq!(router.member_count(&ride("r1")), 1);
    }

    #[test]
    fn broadcast_all_membership_is_implicit() {
        let mut router = RoomRouter::new();
        router.register(1);
        router.register(2);

        assert!(router.is_member(1, &Group::All));
        assert!(router.is_member(2, &Group::All));
        assert!(!router.is_member(3, &Group::All));

        let mut members = router.members_of(&Group::All);
        members.sort_unstable();
        assert_eq!(members, vec![1, 2]);
    }

    #[test]
    fn leave_removes_from_both_maps() {
        let mut router = RoomRouter::new();
        router.register(1);
        router.join(1, ride("r1"));

        assert!(router.leave(1, &ride("r1")));
        assert!(!router.is_member(1, &ride("r1")));
        assert!(router.members_of(&ride("r1")).is_empty());

        // Second leave is a no-op
        assert!(!router.leave(1, &ride("r1")));
    }

    #[test]
    fn leave_all_removes_every_trace() {
        let mut router = RoomRouter::new();
        router.register(1);
        router.register(2);
        router.join(1, ride("r1"));
        router.join(1, Group::OnlineDrivers);
        router.join(2, ride("r1"));

        let groups = router.leave_all(1).unwrap();
        assert_eq!(groups.len(), 2);
        assert!(groups.contains(&ride("r1")));
        assert!(groups.contains(&Group::OnlineDrivers));

        assert!(!router.is_registered(1));
        assert!(!router.is_member(1, &Group::All));
        assert_eq!(router.members_of(&ride("r1")), vec![2]);
        assert_eq!(router.member_count(&Group::OnlineDrivers), 0);

        // Disconnecting twice is a no-op
        assert!(router.leave_all(1).is_none());
    }

    #[test]
    fn connection_may_hold_multiple_ride_rooms() {
        let mut router = RoomRouter::new();
        router.register(1);
        router.join(1, ride("r1"));
        router.join(1, ride("r2"));

        assert!(router.is_member(1, &ride("r1")));
        assert!(router.is_member(1, &ride("r2")));
    }
}
