/// Live-channel fan-out
///
/// Fans one payload out to whichever live connections the registry reports
/// for a user or a room's members. Offline recipients are skipped silently;
/// they are reached later over the push channel by the coordinator, not by
/// this component.
use uuid::Uuid;

use crate::websocket::{ConnectionRegistry, RoomRegistry, ServerEvent};

#[derive(Clone)]
pub struct Broadcaster {
    connections: ConnectionRegistry,
    rooms: RoomRegistry,
}

impl Broadcaster {
    pub fn new(connections: ConnectionRegistry, rooms: RoomRegistry) -> Self {
        Self { connections, rooms }
    }

    /// true iff at least one live handle accepted the event. Offline is an
    /// expected, non-error outcome.
    pub async fn send_to_user(&self, user_id: Uuid, event: ServerEvent) -> bool {
        self.connections.deliver(user_id, &event).await > 0
    }

    /// Resolves membership at call time and sends to each currently-online
    /// member. A send failure for one member never aborts delivery to the
    /// rest. Returns the number of members reached.
    pub async fn send_to_room(&self, room_id: Uuid, event: ServerEvent) -> usize {
        let members = self.rooms.members_of(room_id).await;
        let mut delivered = 0;

        for user_id in members {
            if self.connections.deliver(user_id, &event).await > 0 {
                delivered += 1;
            }
        }

        delivered
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }
}
