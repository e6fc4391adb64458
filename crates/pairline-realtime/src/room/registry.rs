//! Process-local room registry.
//!
//! Tracks which connections joined which room, elects the offerer when the
//! second distinct user joins, and forgets a room once its last member
//! leaves. Every read-modify-write happens under the room's map entry lock,
//! so two near-simultaneous joins cannot both observe a single member.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, info};

use pairline_core::types::{RoomId, UserId};

use crate::connection::handle::ConnectionId;

/// Membership state of one room.
#[derive(Debug, Clone)]
pub struct RoomState {
    /// Joined connections and the user each belongs to.
    members: BTreeMap<ConnectionId, UserId>,
    /// Set once, when the second distinct user joins.
    offerer: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl RoomState {
    fn new() -> Self {
        Self {
            members: BTreeMap::new(),
            offerer: None,
            created_at: Utc::now(),
        }
    }

    fn distinct_users(&self) -> BTreeSet<&UserId> {
        self.members.values().collect()
    }

    /// Joined connections.
    pub fn connections(&self) -> Vec<ConnectionId> {
        self.members.keys().copied().collect()
    }

    /// Distinct users with a joined connection, sorted.
    pub fn users(&self) -> Vec<UserId> {
        self.distinct_users().into_iter().cloned().collect()
    }

    /// Elected offerer, once both users have joined.
    pub fn offerer(&self) -> Option<&UserId> {
        self.offerer.as_ref()
    }
}

/// Result of a join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The connection is now a member; `ready` carries the offerer when this
    /// join completed the pair for the first time.
    Joined {
        members: usize,
        ready: Option<UserId>,
    },
    /// The connection was already a member; nothing changed.
    AlreadyJoined { members: usize },
}

/// Result of a leave.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LeaveOutcome {
    /// Whether the connection was a member.
    pub left: bool,
    /// Connections still in the room.
    pub remaining: Vec<ConnectionId>,
    /// Whether the room was deleted because it became empty.
    pub room_closed: bool,
}

/// Registry of signaling rooms on this process.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: DashMap<RoomId, RoomState>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room, creating the room on first join.
    pub fn join_room(&self, room_id: &RoomId, conn_id: ConnectionId, user_id: &UserId) -> JoinOutcome {
        let mut state = self
            .rooms
            .entry(room_id.clone())
            .or_insert_with(RoomState::new);

        if state.members.contains_key(&conn_id) {
            return JoinOutcome::AlreadyJoined {
                members: state.members.len(),
            };
        }
        state.members.insert(conn_id, user_id.clone());

        let mut ready = None;
        if state.offerer.is_none() {
            let users = state.distinct_users();
            if users.len() == 2 {
                let offerer = users.first().map(|u| (*u).clone());
                state.offerer = offerer.clone();
                ready = offerer;
            }
        }

        debug!(
            room_id = %room_id,
            conn_id = %conn_id,
            user_id = %user_id,
            members = state.members.len(),
            "Connection joined room"
        );
        if let Some(offerer) = &ready {
            info!(room_id = %room_id, offerer = %offerer, "Room ready");
        }

        JoinOutcome::Joined {
            members: state.members.len(),
            ready,
        }
    }

    /// Remove a connection from a room, deleting the room when it empties.
    pub fn leave_room(&self, room_id: &RoomId, conn_id: &ConnectionId) -> LeaveOutcome {
        let Entry::Occupied(mut entry) = self.rooms.entry(room_id.clone()) else {
            return LeaveOutcome::default();
        };

        let left = entry.get_mut().members.remove(conn_id).is_some();
        let remaining = entry.get().connections();
        let room_closed = remaining.is_empty();
        if room_closed {
            entry.remove();
            debug!(room_id = %room_id, "Room empty, deleted");
        }

        LeaveOutcome {
            left,
            remaining,
            room_closed,
        }
    }

    /// Remove a connection from every room it is still a member of,
    /// deleting rooms that become empty. Returns the rooms it left.
    pub fn leave_all(&self, conn_id: &ConnectionId) -> Vec<RoomId> {
        let mut left = Vec::new();
        self.rooms.retain(|room_id, state| {
            if state.members.remove(conn_id).is_none() {
                return true;
            }
            left.push(room_id.clone());
            !state.members.is_empty()
        });
        left
    }

    /// Delete a room outright, returning its last state.
    pub fn remove_room(&self, room_id: &RoomId) -> Option<RoomState> {
        self.rooms.remove(room_id).map(|(_, state)| state)
    }

    /// Number of joined connections.
    pub fn room_members(&self, room_id: &RoomId) -> usize {
        self.rooms
            .get(room_id)
            .map(|state| state.members.len())
            .unwrap_or(0)
    }

    /// Whether a connection is a member of a room.
    pub fn is_member(&self, room_id: &RoomId, conn_id: &ConnectionId) -> bool {
        self.rooms
            .get(room_id)
            .is_some_and(|state| state.members.contains_key(conn_id))
    }

    /// Members other than `conn_id`.
    pub fn other_members(&self, room_id: &RoomId, conn_id: &ConnectionId) -> Vec<ConnectionId> {
        self.rooms
            .get(room_id)
            .map(|state| {
                state
                    .members
                    .keys()
                    .filter(|id| *id != conn_id)
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Snapshot of a room.
    pub fn room(&self, room_id: &RoomId) -> Option<RoomState> {
        self.rooms.get(room_id).map(|state| state.clone())
    }

    /// Number of live rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::*;

    fn ids() -> (RoomId, ConnectionId, ConnectionId) {
        (RoomId::from("room-1"), Uuid::new_v4(), Uuid::new_v4())
    }

    #[test]
    fn test_second_user_makes_room_ready_once() {
        let registry = RoomRegistry::new();
        let (room, c1, c2) = ids();

        assert_eq!(
            registry.join_room(&room, c1, &UserId::from("zoe")),
            JoinOutcome::Joined {
                members: 1,
                ready: None
            }
        );
        assert_eq!(
            registry.join_room(&room, c2, &UserId::from("adam")),
            JoinOutcome::Joined {
                members: 2,
                ready: Some(UserId::from("adam"))
            }
        );
        assert_eq!(
            registry.join_room(&room, c2, &UserId::from("adam")),
            JoinOutcome::AlreadyJoined { members: 2 }
        );
    }

    #[test]
    fn test_offerer_independent_of_join_order() {
        for order in [["a", "b"], ["b", "a"]] {
            let registry = RoomRegistry::new();
            let (room, c1, c2) = ids();
            registry.join_room(&room, c1, &UserId::from(order[0]));
            registry.join_room(&room, c2, &UserId::from(order[1]));
            assert_eq!(
                registry.room(&room).unwrap().offerer(),
                Some(&UserId::from("a"))
            );
        }
    }

    #[test]
    fn test_same_user_twice_is_not_ready() {
        let registry = RoomRegistry::new();
        let (room, c1, c2) = ids();
        registry.join_room(&room, c1, &UserId::from("a"));
        assert_eq!(
            registry.join_room(&room, c2, &UserId::from("a")),
            JoinOutcome::Joined {
                members: 2,
                ready: None
            }
        );
    }

    #[test]
    fn test_rejoin_after_leave_does_not_refire_ready() {
        let registry = RoomRegistry::new();
        let (room, c1, c2) = ids();
        registry.join_room(&room, c1, &UserId::from("a"));
        registry.join_room(&room, c2, &UserId::from("b"));

        let outcome = registry.leave_room(&room, &c2);
        assert_eq!(outcome.remaining, vec![c1]);
        assert!(!outcome.room_closed);

        let c3 = Uuid::new_v4();
        assert_eq!(
            registry.join_room(&room, c3, &UserId::from("b")),
            JoinOutcome::Joined {
                members: 2,
                ready: None
            }
        );
    }

    #[test]
    fn test_last_leave_deletes_room() {
        let registry = RoomRegistry::new();
        let (room, c1, c2) = ids();
        registry.join_room(&room, c1, &UserId::from("a"));

        assert!(!registry.leave_room(&room, &c2).left);
        let outcome = registry.leave_room(&room, &c1);
        assert!(outcome.left && outcome.room_closed);
        assert_eq!(registry.room_members(&room), 0);
        assert_eq!(registry.leave_room(&room, &c1), LeaveOutcome::default());
    }

    #[test]
    fn test_leave_all_drops_every_membership() {
        let registry = RoomRegistry::new();
        let (r1, c1, c2) = ids();
        let r2 = RoomId::from("room-2");
        registry.join_room(&r1, c1, &UserId::from("a"));
        registry.join_room(&r1, c2, &UserId::from("b"));
        registry.join_room(&r2, c2, &UserId::from("b"));

        let mut left = registry.leave_all(&c2);
        left.sort();
        assert_eq!(left, vec![r1.clone(), r2.clone()]);
        assert_eq!(registry.room_members(&r1), 1);
        assert!(registry.room(&r2).is_none());
        assert!(registry.leave_all(&c2).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_joins_elect_exactly_once() {
        for _ in 0..50 {
            let registry = Arc::new(RoomRegistry::new());
            let room = RoomId::generate();
            let tasks: Vec<_> = ["a", "b"]
                .into_iter()
                .map(|user| {
                    let registry = registry.clone();
                    let room = room.clone();
                    tokio::spawn(async move {
                        registry.join_room(&room, Uuid::new_v4(), &UserId::from(user))
                    })
                })
                .collect();

            let mut ready = 0;
            for task in tasks {
                if let JoinOutcome::Joined { ready: Some(_), .. } = task.await.unwrap() {
                    ready += 1;
                }
            }
            assert_eq!(ready, 1);
        }
    }
}
