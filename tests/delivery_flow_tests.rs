/// End-to-end tests for the notification fan-out core
///
/// Wires real registries, broadcaster, dispatcher and coordinator against
/// in-memory collaborator fakes (user/device directory, last-seen store,
/// push provider) and drives whole delivery flows through
/// `NotificationCoordinator::notify`.
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use presence_service::directory::{DeviceDirectory, LastSeenStore, UserDirectory};
use presence_service::error::{AppError, AppResult};
use presence_service::models::{
    Device, DevicePlatform, DispatchStatus, EventKind, NotificationEnvelope, NotificationTarget,
};
use presence_service::services::expo_client::{PushMessage, PushProvider, PushReceipt, PushTicket};
use presence_service::services::{
    Broadcaster, NotificationCoordinator, PushDispatcher, RatePolicy,
};
use presence_service::websocket::{ConnectionId, ConnectionRegistry, RoomRegistry, ServerEvent};

#[derive(Default)]
struct FakeBackend {
    users: Mutex<HashSet<Uuid>>,
    devices: Mutex<HashMap<Uuid, Vec<Device>>>,
    last_seen: Mutex<Vec<Uuid>>,
}

impl FakeBackend {
    fn add_user(&self, user_id: Uuid) {
        self.users.lock().unwrap().insert(user_id);
    }

    fn add_device(&self, user_id: Uuid, token: &str) {
        self.devices.lock().unwrap().entry(user_id).or_default().push(Device {
            id: Uuid::new_v4(),
            user_id,
            token: token.to_string(),
            platform: DevicePlatform::Android,
            is_active: true,
        });
    }
}

#[async_trait]
impl UserDirectory for FakeBackend {
    async fn exists(&self, user_id: Uuid) -> AppResult<bool> {
        Ok(self.users.lock().unwrap().contains(&user_id))
    }
}

#[async_trait]
impl DeviceDirectory for FakeBackend {
    async fn active_devices(&self, user_id: Uuid) -> AppResult<Vec<Device>> {
        Ok(self
            .devices
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn mark_token_invalid(&self, user_id: Uuid, token: &str) -> AppResult<()> {
        if let Some(devices) = self.devices.lock().unwrap().get_mut(&user_id) {
            devices.retain(|d| d.token != token);
        }
        Ok(())
    }
}

#[async_trait]
impl LastSeenStore for FakeBackend {
    async fn record_last_seen(
        &self,
        user_id: Uuid,
        _seen_at: chrono::DateTime<chrono::Utc>,
    ) -> AppResult<()> {
        self.last_seen.lock().unwrap().push(user_id);
        Ok(())
    }
}

#[derive(Default)]
struct RecordingProvider {
    sent: Mutex<Vec<PushMessage>>,
}

#[async_trait]
impl PushProvider for RecordingProvider {
    async fn send_batch(&self, messages: Vec<PushMessage>) -> Result<Vec<PushTicket>, String> {
        let tickets = messages
            .iter()
            .enumerate()
            .map(|(i, _)| PushTicket::ok(format!("ticket-{i}")))
            .collect();
        self.sent.lock().unwrap().extend(messages);
        Ok(tickets)
    }

    async fn check_receipts(
        &self,
        _ticket_ids: Vec<String>,
    ) -> Result<Vec<(String, PushReceipt)>, String> {
        Ok(Vec::new())
    }
}

struct Harness {
    backend: Arc<FakeBackend>,
    provider: Arc<RecordingProvider>,
    connections: ConnectionRegistry,
    rooms: RoomRegistry,
    coordinator: Arc<NotificationCoordinator>,
}

fn harness() -> Harness {
    let backend = Arc::new(FakeBackend::default());
    let provider = Arc::new(RecordingProvider::default());

    let connections = ConnectionRegistry::new(backend.clone());
    let rooms = RoomRegistry::new();
    let broadcaster = Broadcaster::new(connections.clone(), rooms.clone());
    let push = PushDispatcher::new(backend.clone(), Some(provider.clone()));

    let coordinator = Arc::new(
        NotificationCoordinator::new(
            backend.clone(),
            broadcaster,
            push,
            Duration::from_secs(120),
        )
        .with_policy(
            EventKind::Suggestion,
            RatePolicy::new(1, Duration::from_secs(5)),
        ),
    );

    Harness {
        backend,
        provider,
        connections,
        rooms,
        coordinator,
    }
}

async fn connect(h: &Harness, user_id: Uuid) -> mpsc::UnboundedReceiver<ServerEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    h.connections.register(user_id, ConnectionId::new(), tx).await;
    rx
}

// User A (online, 2 devices) and user B (offline, 1 device) are members of
// one room; a chat message fans out. The socket path reaches A only, the
// push path reaches all three devices, each independent of the other.
#[tokio::test]
async fn room_message_reaches_socket_and_push_independently() {
    let h = harness();
    let room_id = Uuid::new_v4();
    let sender = Uuid::new_v4();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    for user in [a, b] {
        h.backend.add_user(user);
        h.rooms.join(user, room_id).await;
    }
    h.backend.add_device(a, "ExponentPushToken[a-phone]");
    h.backend.add_device(a, "ExponentPushToken[a-tablet]");
    h.backend.add_device(b, "ExponentPushToken[b-phone]");

    let mut rx_a = connect(&h, a).await;

    let envelope = NotificationEnvelope::new(
        EventKind::ChatMessage,
        NotificationTarget::Room(room_id),
        Some(sender),
        Uuid::new_v4(),
    )
    .with_title("Sender")
    .with_body("meeting moved to 3pm")
    .with_data(serde_json::json!({"text": "meeting moved to 3pm"}));

    let summary = h.coordinator.notify(envelope).await.unwrap();

    assert_eq!(summary.status, DispatchStatus::Dispatched);
    assert_eq!(summary.socket_delivered, 1);
    assert_eq!(summary.push_total, 3);
    assert_eq!(summary.push_success, 3);

    // A's live connection got the room event
    let event = rx_a.recv().await.unwrap();
    assert!(matches!(event, ServerEvent::NewMessage { room_id: r, .. } if r == room_id));

    // all three device tokens were submitted to the provider
    let sent = h.provider.sent.lock().unwrap();
    let tokens: Vec<&str> = sent.iter().map(|m| m.to.as_str()).collect();
    assert_eq!(sent.len(), 3);
    for token in [
        "ExponentPushToken[a-phone]",
        "ExponentPushToken[a-tablet]",
        "ExponentPushToken[b-phone]",
    ] {
        assert!(tokens.contains(&token));
    }
}

// Three suggestion notifications from one actor inside one second, with a
// limit of 1 per 5 seconds: one dispatched, two dropped.
#[tokio::test]
async fn suggestion_burst_is_rate_limited() {
    let h = harness();
    let actor = Uuid::new_v4();
    let target = Uuid::new_v4();
    h.backend.add_user(target);
    h.backend.add_device(target, "ExponentPushToken[target]");

    let mut dispatched = 0;
    let mut limited = 0;
    for _ in 0..3 {
        let envelope = NotificationEnvelope::new(
            EventKind::Suggestion,
            NotificationTarget::User(target),
            Some(actor),
            Uuid::new_v4(),
        );
        match h.coordinator.notify(envelope).await.unwrap().status {
            DispatchStatus::Dispatched => dispatched += 1,
            DispatchStatus::RateLimited => limited += 1,
            DispatchStatus::Duplicate => panic!("distinct events must not dedupe"),
        }
    }

    assert_eq!(dispatched, 1);
    assert_eq!(limited, 2);
    // dropped notifications attempted zero deliveries
    assert_eq!(h.provider.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn rate_limit_recovers_after_window() {
    let h = harness();
    let backend = h.backend.clone();
    let actor = Uuid::new_v4();
    let target = Uuid::new_v4();
    backend.add_user(target);

    // tight window so the test stays fast
    let coordinator = Arc::new(
        NotificationCoordinator::new(
            backend.clone(),
            Broadcaster::new(h.connections.clone(), h.rooms.clone()),
            PushDispatcher::new(backend.clone(), Some(h.provider.clone())),
            Duration::from_secs(120),
        )
        .with_policy(
            EventKind::Suggestion,
            RatePolicy::new(1, Duration::from_millis(100)),
        ),
    );

    let envelope = |object: Uuid| {
        NotificationEnvelope::new(
            EventKind::Suggestion,
            NotificationTarget::User(target),
            Some(actor),
            object,
        )
    };

    let first = coordinator.notify(envelope(Uuid::new_v4())).await.unwrap();
    let second = coordinator.notify(envelope(Uuid::new_v4())).await.unwrap();
    assert_eq!(first.status, DispatchStatus::Dispatched);
    assert_eq!(second.status, DispatchStatus::RateLimited);

    tokio::time::sleep(Duration::from_millis(150)).await;

    let third = coordinator.notify(envelope(Uuid::new_v4())).await.unwrap();
    assert_eq!(third.status, DispatchStatus::Dispatched);
}

#[tokio::test]
async fn unknown_recipient_surfaces_as_error() {
    let h = harness();
    let envelope = NotificationEnvelope::new(
        EventKind::TaskAssigned,
        NotificationTarget::User(Uuid::new_v4()),
        None,
        Uuid::new_v4(),
    );

    let err = h.coordinator.notify(envelope).await.unwrap_err();
    assert!(matches!(err, AppError::UnknownRecipient(_)));
}

// Offline user, no devices: every count is zero and nothing errors; the
// triggering domain operation must still succeed.
#[tokio::test]
async fn expected_absence_is_not_an_error() {
    let h = harness();
    let user_id = Uuid::new_v4();
    h.backend.add_user(user_id);

    let envelope = NotificationEnvelope::new(
        EventKind::ComplaintStatusChanged,
        NotificationTarget::User(user_id),
        None,
        Uuid::new_v4(),
    );

    let summary = h.coordinator.notify(envelope).await.unwrap();
    assert_eq!(summary.status, DispatchStatus::Dispatched);
    assert_eq!(summary.socket_delivered, 0);
    assert_eq!(summary.push_success, 0);
    assert_eq!(summary.push_total, 0);
}

#[tokio::test]
async fn duplicate_dedupe_key_attempts_no_second_delivery() {
    let h = harness();
    let user_id = Uuid::new_v4();
    h.backend.add_user(user_id);
    h.backend.add_device(user_id, "ExponentPushToken[phone]");

    let envelope = NotificationEnvelope::new(
        EventKind::Announcement,
        NotificationTarget::User(user_id),
        None,
        Uuid::new_v4(),
    );

    let first = h.coordinator.notify(envelope.clone()).await.unwrap();
    let second = h.coordinator.notify(envelope).await.unwrap();

    assert_eq!(first.status, DispatchStatus::Dispatched);
    assert_eq!(second.status, DispatchStatus::Duplicate);
    assert_eq!(h.provider.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn disconnect_records_last_seen_once() {
    let h = harness();
    let user_id = Uuid::new_v4();

    let connection_id = ConnectionId::new();
    let (tx, _rx) = mpsc::unbounded_channel();
    h.connections.register(user_id, connection_id, tx).await;
    assert!(h.connections.is_online(user_id).await);

    // double-fired close event, as the transport can produce
    h.connections.unregister(user_id, connection_id).await;
    h.connections.unregister(user_id, connection_id).await;

    assert!(!h.connections.is_online(user_id).await);
    assert_eq!(h.backend.last_seen.lock().unwrap().as_slice(), &[user_id]);
}

#[tokio::test]
async fn background_dispatch_completes_without_surfacing_failures() {
    let h = harness();
    let user_id = Uuid::new_v4();
    h.backend.add_user(user_id);
    let mut rx = connect(&h, user_id).await;

    let envelope = NotificationEnvelope::new(
        EventKind::TeamAssignment,
        NotificationTarget::User(user_id),
        None,
        Uuid::new_v4(),
    );

    let handle = h.coordinator.notify_background(envelope);
    handle.await.unwrap();

    assert!(rx.recv().await.is_some());

    // and a failing one still resolves cleanly
    let bad = NotificationEnvelope::new(
        EventKind::TeamAssignment,
        NotificationTarget::User(Uuid::new_v4()),
        None,
        Uuid::new_v4(),
    );
    h.coordinator.notify_background(bad).await.unwrap();
}
