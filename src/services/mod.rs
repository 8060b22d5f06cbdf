pub mod broadcaster;
pub mod coordinator;
pub mod expo_client;
pub mod push_dispatcher;
pub mod rate_limit;

pub use broadcaster::Broadcaster;
pub use coordinator::NotificationCoordinator;
pub use expo_client::{ExpoPushClient, PushMessage, PushProvider, PushReceipt, PushTicket};
pub use push_dispatcher::{PushDispatcher, PushOutcome};
pub use rate_limit::{RateDecision, RateLimiter, RatePolicy};
