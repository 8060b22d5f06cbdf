pub mod notifications;
pub mod rooms;
pub mod websocket;
