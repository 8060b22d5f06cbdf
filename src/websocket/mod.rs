use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

pub mod manager;
pub mod messages;
pub mod rooms;

pub use manager::ConnectionRegistry;
pub use messages::{ClientEvent, ServerEvent};
pub use rooms::RoomRegistry;

/// Sender half of one live duplex connection
pub type EventSender = UnboundedSender<ServerEvent>;

/// Unique identifier for one live duplex connection.
///
/// Each WebSocket session gets its own id at handshake time, so close events
/// can remove exactly the handle that died while the user's other
/// connections stay registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}
