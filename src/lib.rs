pub mod config;
pub mod directory;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;
pub mod websocket;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use services::{Broadcaster, NotificationCoordinator, PushDispatcher};
pub use state::AppState;
pub use websocket::{ConnectionRegistry, RoomRegistry, ServerEvent};
