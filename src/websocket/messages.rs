/// Wire events for the duplex channel
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events pushed from server to client. The payload of each variant is a
/// presentation contract with the frontend; nothing here is persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Connection established confirmation
    Welcome { server_id: String, timestamp: i64 },

    /// Chat message delivered to a room member
    NewMessage {
        room_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        sender_id: Option<Uuid>,
        payload: serde_json::Value,
        timestamp: i64,
    },

    /// Non-chat notification delivered to a user
    NewNotification {
        kind: String,
        title: String,
        body: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<serde_json::Value>,
        timestamp: i64,
    },

    RoomJoined { room_id: Uuid, user_id: Uuid },

    RoomLeft { room_id: Uuid, user_id: Uuid },
}

impl ServerEvent {
    pub fn welcome() -> Self {
        ServerEvent::Welcome {
            server_id: Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn new_message(
        room_id: Uuid,
        sender_id: Option<Uuid>,
        payload: serde_json::Value,
    ) -> Self {
        ServerEvent::NewMessage {
            room_id,
            sender_id,
            payload,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn new_notification(
        kind: &str,
        title: &str,
        body: &str,
        data: Option<serde_json::Value>,
    ) -> Self {
        ServerEvent::NewNotification {
            kind: kind.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            data,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn room_joined(room_id: Uuid, user_id: Uuid) -> Self {
        ServerEvent::RoomJoined { room_id, user_id }
    }

    pub fn room_left(room_id: Uuid, user_id: Uuid) -> Self {
        ServerEvent::RoomLeft { room_id, user_id }
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Frames accepted from clients over the duplex channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    Join { room_id: Uuid },
    Leave { room_id: Uuid },
}
