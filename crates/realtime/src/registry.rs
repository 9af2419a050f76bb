//! Concurrency-safe bookkeeping of live connections.
//!
//! Users and rooms live in separate sharded maps so that delivery to one user
//! or room never waits on registration traffic for another. Mutations only
//! touch memory; presence updates are handed to a [`PresenceSink`] that must
//! return without performing I/O.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::connection::{ConnectionHandle, ConnectionId};
use crate::{RoomId, UserId};

/// Receives online/offline transitions. Implementations must not block.
pub trait PresenceSink: Send + Sync + 'static {
    fn presence_changed(&self, user_id: UserId, online: bool);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPresence;

impl PresenceSink for NoopPresence {
    fn presence_changed(&self, _user_id: UserId, _online: bool) {}
}

type ConnectionSet = HashMap<ConnectionId, ConnectionHandle>;

pub struct ConnectionRegistry {
    users: DashMap<UserId, ConnectionSet>,
    rooms: DashMap<RoomId, ConnectionSet>,
    memberships: DashMap<ConnectionId, RoomId>,
    presence: Arc<dyn PresenceSink>,
}

impl ConnectionRegistry {
    pub fn new(presence: Arc<dyn PresenceSink>) -> Self {
        Self {
            users: DashMap::new(),
            rooms: DashMap::new(),
            memberships: DashMap::new(),
            presence,
        }
    }

    /// Adds `connection` under `user_id`. Returns `true` when it is the user's first live connection.
    pub fn register(&self, user_id: UserId, connection: ConnectionHandle) -> bool {
        debug_assert_eq!(user_id, connection.user_id());
        let connection_id = connection.id();

        let mut set = self.users.entry(user_id).or_default();
        let first = set.is_empty();
        set.insert(connection_id, connection);
        // Reported under the entry lock so transitions reach the sink in order.
        if first {
            self.presence.presence_changed(user_id, true);
        }
        drop(set);

        debug!(user_id, %connection_id, first, "connection registered");
        first
    }

    /// Removes the connection, its room membership and its liveness.
    ///
    /// Returns `false` when the connection was not registered, so repeated calls are harmless.
    pub fn unregister(&self, user_id: UserId, connection_id: ConnectionId) -> bool {
        let (removed, last) = match self.users.entry(user_id) {
            Entry::Occupied(mut entry) => {
                let removed = entry.get_mut().remove(&connection_id);
                let last = removed.is_some() && entry.get().is_empty();
                if last {
                    self.presence.presence_changed(user_id, false);
                }
                if entry.get().is_empty() {
                    entry.remove();
                }
                (removed, last)
            }
            Entry::Vacant(_) => (None, false),
        };

        let Some(connection) = removed else {
            return false;
        };

        connection.mark_closed();
        if let Some((_, room_id)) = self.memberships.remove(&connection_id) {
            self.detach(room_id, connection_id);
        }

        debug!(user_id, %connection_id, last, "connection unregistered");
        true
    }

    /// Subscribes `connection` to `room_id`, leaving whichever room it was in before.
    ///
    /// Returns `false` for a connection that is no longer alive, including one
    /// unregistered while the join was in progress.
    pub fn join_room(&self, room_id: RoomId, connection: &ConnectionHandle) -> bool {
        if !connection.is_alive() {
            return false;
        }

        let connection_id = connection.id();
        if let Some(previous) = self.memberships.insert(connection_id, room_id) {
            if previous != room_id {
                self.detach(previous, connection_id);
            }
        }

        self.rooms
            .entry(room_id)
            .or_default()
            .insert(connection_id, connection.clone());

        // An unregister that ran between the liveness check and the inserts
        // has already cleaned up and will not see this membership.
        if !connection.is_alive() || self.room_of(connection_id) != Some(room_id) {
            self.memberships
                .remove_if(&connection_id, |_, current| *current == room_id);
            self.detach(room_id, connection_id);
            debug!(room_id, %connection_id, "connection closed while joining");
            return false;
        }

        debug!(room_id, %connection_id, "joined room");
        true
    }

    pub fn leave_room(&self, room_id: RoomId, connection_id: ConnectionId) -> bool {
        let left = self
            .memberships
            .remove_if(&connection_id, |_, current| *current == room_id)
            .is_some();
        if left {
            self.detach(room_id, connection_id);
            debug!(room_id, %connection_id, "left room");
        }
        left
    }

    fn detach(&self, room_id: RoomId, connection_id: ConnectionId) {
        if let Entry::Occupied(mut entry) = self.rooms.entry(room_id) {
            entry.get_mut().remove(&connection_id);
            if entry.get().is_empty() {
                entry.remove();
            }
        }
    }

    /// Snapshot of the user's connections; delivery happens outside the map lock.
    pub fn connections_for_user(&self, user_id: UserId) -> Vec<ConnectionHandle> {
        self.users
            .get(&user_id)
            .map(|set| set.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn connections_in_room(&self, room_id: RoomId) -> Vec<ConnectionHandle> {
        self.rooms
            .get(&room_id)
            .map(|set| set.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn room_of(&self, connection_id: ConnectionId) -> Option<RoomId> {
        self.memberships.get(&connection_id).map(|room| *room)
    }

    pub fn connection_count(&self, user_id: UserId) -> usize {
        self.users.get(&user_id).map(|set| set.len()).unwrap_or(0)
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.connection_count(user_id) > 0
    }

    pub fn room_size(&self, room_id: RoomId) -> usize {
        self.rooms.get(&room_id).map(|set| set.len()).unwrap_or(0)
    }

    /// Users with at least one live connection.
    pub fn online_users(&self) -> usize {
        self.users.len()
    }
}
