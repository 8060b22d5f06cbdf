/// Room membership registry
///
/// Bookkeeping for which users belong to which rooms (1:1 chats, group
/// threads, broadcast groups), decoupled from connection state: a member can
/// be offline and stay a member. Rooms are not pre-declared; they spring
/// into existence on first join and disappear on last leave. Membership for
/// rooms backed by a persistent chat thread is re-derived from that entity
/// by the owning collaborator on restart.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct RoomMaps {
    room_users: HashMap<Uuid, HashSet<Uuid>>,
    user_rooms: HashMap<Uuid, HashSet<Uuid>>,
}

/// The two maps are mirror images and are only mutated here, under one lock,
/// so `u ∈ room_users[r]` iff `r ∈ user_rooms[u]` at every observable point.
#[derive(Default, Clone)]
pub struct RoomRegistry {
    inner: Arc<RwLock<RoomMaps>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user to a room; idempotent
    pub async fn join(&self, user_id: Uuid, room_id: Uuid) {
        let mut maps = self.inner.write().await;
        maps.room_users.entry(room_id).or_default().insert(user_id);
        maps.user_rooms.entry(user_id).or_default().insert(room_id);

        tracing::debug!(%user_id, %room_id, members = maps.room_users[&room_id].len(), "joined room");
    }

    /// Remove a user from a room; leaving a room the user never joined is a
    /// no-op. Empty rooms are fully removed.
    pub async fn leave(&self, user_id: Uuid, room_id: Uuid) {
        let mut maps = self.inner.write().await;

        if let Some(members) = maps.room_users.get_mut(&room_id) {
            members.remove(&user_id);
            if members.is_empty() {
                maps.room_users.remove(&room_id);
                tracing::debug!(%room_id, "removed empty room");
            }
        }

        if let Some(rooms) = maps.user_rooms.get_mut(&user_id) {
            rooms.remove(&room_id);
            if rooms.is_empty() {
                maps.user_rooms.remove(&user_id);
            }
        }
    }

    pub async fn members_of(&self, room_id: Uuid) -> HashSet<Uuid> {
        let maps = self.inner.read().await;
        maps.room_users.get(&room_id).cloned().unwrap_or_default()
    }

    pub async fn rooms_of(&self, user_id: Uuid) -> HashSet<Uuid> {
        let maps = self.inner.read().await;
        maps.user_rooms.get(&user_id).cloned().unwrap_or_default()
    }

    pub async fn is_member(&self, user_id: Uuid, room_id: Uuid) -> bool {
        let maps = self.inner.read().await;
        maps.room_users
            .get(&room_id)
            .map(|m| m.contains(&user_id))
            .unwrap_or(false)
    }

    pub async fn member_count(&self, room_id: Uuid) -> usize {
        let maps = self.inner.read().await;
        maps.room_users.get(&room_id).map(|m| m.len()).unwrap_or(0)
    }

    /// Number of rooms with at least one member (for status endpoints)
    pub async fn room_count(&self) -> usize {
        let maps = self.inner.read().await;
        maps.room_users.len()
    }
}
