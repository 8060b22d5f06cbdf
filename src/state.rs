use std::sync::Arc;

use crate::{
    config::Config,
    services::{Broadcaster, NotificationCoordinator},
    websocket::{ConnectionRegistry, RoomRegistry},
};

/// Explicitly constructed shared state, created once at process start and
/// handed to every consumer by reference. Fresh instances per test give
/// isolation that module-level singletons cannot.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub connections: ConnectionRegistry,
    pub rooms: RoomRegistry,
    pub broadcaster: Broadcaster,
    pub coordinator: Arc<NotificationCoordinator>,
}
