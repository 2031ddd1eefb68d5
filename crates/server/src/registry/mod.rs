// Connection registry: live sockets per user, and room membership.
//
// A user may be connected from 0..N devices at once; each device owns
// one WebSocket and one entry here. Presence is derived purely from
// occupancy — no heartbeat, no TTL. The registry is per-process memory:
// it does not survive a restart and does not span server instances
// (an external broker would be needed for that; out of scope).

use std::collections::{HashMap, HashSet};

use roomline_common::protocol::ws::ChatEvent;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Outbound channel for one live connection.
pub type ConnectionSender = mpsc::UnboundedSender<ChatEvent>;

type ConnKey = (Uuid, Uuid); // (user_id, conn_id)

/// Tracks which users are connected, through which connections, and
/// which conversation rooms each connection has joined.
///
/// Explicitly constructed and injected wherever it is needed; there is
/// no ambient global instance.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    inner: RwLock<RegistryInner>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    connections: HashMap<Uuid, HashMap<Uuid, ConnectionSender>>,
    rooms: HashMap<String, HashSet<ConnKey>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly-authenticated connection for `user_id`.
    /// Creates the user's slot on first connect.
    pub async fn register(&self, user_id: Uuid, conn_id: Uuid, sender: ConnectionSender) {
        let mut guard = self.inner.write().await;
        guard.connections.entry(user_id).or_default().insert(conn_id, sender);
    }

    /// Remove one specific connection and its room memberships.
    /// Other connections of the same user are unaffected.
    pub async fn unregister(&self, user_id: Uuid, conn_id: Uuid) {
        let mut guard = self.inner.write().await;
        let slot_empty = match guard.connections.get_mut(&user_id) {
            Some(connections) => {
                connections.remove(&conn_id);
                connections.is_empty()
            }
            None => false,
        };
        if slot_empty {
            // An empty slot is indistinguishable from an absent one for
            // presence; drop it entirely.
            guard.connections.remove(&user_id);
        }
        let key = (user_id, conn_id);
        guard.rooms.retain(|_, members| {
            members.remove(&key);
            !members.is_empty()
        });
    }

    /// Join a conversation room. Returns false if the connection is not
    /// registered (a race with its own disconnect).
    pub async fn join_room(&self, room_id: &str, user_id: Uuid, conn_id: Uuid) -> bool {
        let mut guard = self.inner.write().await;
        let registered = guard
            .connections
            .get(&user_id)
            .is_some_and(|connections| connections.contains_key(&conn_id));
        if !registered {
            return false;
        }
        guard.rooms.entry(room_id.to_string()).or_default().insert((user_id, conn_id));
        true
    }

    pub async fn leave_room(&self, room_id: &str, user_id: Uuid, conn_id: Uuid) {
        let mut guard = self.inner.write().await;
        if let Some(members) = guard.rooms.get_mut(room_id) {
            members.remove(&(user_id, conn_id));
            if members.is_empty() {
                guard.rooms.remove(room_id);
            }
        }
    }

    /// Online iff the user has at least one live connection right now.
    pub async fn is_online(&self, user_id: Uuid) -> bool {
        let guard = self.inner.read().await;
        guard.connections.get(&user_id).is_some_and(|connections| !connections.is_empty())
    }

    pub async fn connection_count(&self, user_id: Uuid) -> usize {
        let guard = self.inner.read().await;
        guard.connections.get(&user_id).map_or(0, |connections| connections.len())
    }

    /// Snapshot of the user's outbound channels. Fanout iterates this
    /// clone, never the live map, so a concurrent disconnect cannot
    /// skip or double-process entries.
    pub async fn connections_for(&self, user_id: Uuid) -> Vec<ConnectionSender> {
        let guard = self.inner.read().await;
        guard
            .connections
            .get(&user_id)
            .map(|connections| connections.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of the outbound channels of every connection in a room.
    pub async fn room_senders(&self, room_id: &str) -> Vec<ConnectionSender> {
        let guard = self.inner.read().await;
        let Some(members) = guard.rooms.get(room_id) else {
            return Vec::new();
        };
        members
            .iter()
            .filter_map(|(user_id, conn_id)| {
                guard.connections.get(user_id).and_then(|connections| connections.get(conn_id))
            })
            .cloned()
            .collect()
    }
}
