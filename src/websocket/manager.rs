/// Connection registry for the duplex channel
///
/// Authoritative map of which users are currently reachable over a live
/// WebSocket and through which handle(s). Supports:
/// - Multiple concurrent connections per user (multi-device, multi-tab)
/// - Handle-precise cleanup when one connection closes
/// - "Last seen" side effect on the transition to offline
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ConnectionId, EventSender};
use crate::directory::LastSeenStore;
use crate::metrics;
use crate::websocket::messages::ServerEvent;

struct Connection {
    id: ConnectionId,
    sender: EventSender,
    connected_at: chrono::DateTime<chrono::Utc>,
}

/// Thread-safe registry shared across request-handling tasks.
/// Mutated only through its own methods; broadcast reads interleave freely.
#[derive(Clone)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<Uuid, Vec<Connection>>>>,
    last_seen: Arc<dyn LastSeenStore>,
}

impl ConnectionRegistry {
    pub fn new(last_seen: Arc<dyn LastSeenStore>) -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            last_seen,
        }
    }

    /// Record a live connection for a user. Registering the same handle id
    /// again replaces its sender instead of duplicating the entry.
    pub async fn register(&self, user_id: Uuid, connection_id: ConnectionId, sender: EventSender) {
        let mut connections = self.connections.write().await;
        let entries = connections.entry(user_id).or_default();

        if let Some(existing) = entries.iter_mut().find(|c| c.id == connection_id) {
            existing.sender = sender;
        } else {
            entries.push(Connection {
                id: connection_id,
                sender,
                connected_at: chrono::Utc::now(),
            });
            metrics::connection_opened();
        }

        tracing::debug!(%user_id, ?connection_id, total = entries.len(), "connection registered");
    }

    /// Remove exactly one handle. Unregistering a handle that was never
    /// registered is a no-op; close events can double-fire.
    ///
    /// When the last handle for a user goes away, a timestamped "last seen"
    /// is recorded in the collaborator store. The caller invokes this from
    /// the channel's own close/error path, so the side effect happens for
    /// abnormal drops too.
    pub async fn unregister(&self, user_id: Uuid, connection_id: ConnectionId) {
        let went_offline = {
            let mut connections = self.connections.write().await;
            match connections.get_mut(&user_id) {
                None => false,
                Some(entries) => {
                    let before = entries.len();
                    entries.retain(|c| c.id != connection_id);
                    if entries.len() != before {
                        metrics::connection_closed();
                        tracing::debug!(%user_id, ?connection_id, remaining = entries.len(), "connection removed");
                    }
                    if entries.is_empty() {
                        connections.remove(&user_id);
                        true
                    } else {
                        false
                    }
                }
            }
        };

        if went_offline {
            if let Err(e) = self
                .last_seen
                .record_last_seen(user_id, chrono::Utc::now())
                .await
            {
                tracing::warn!(%user_id, error = %e, "failed to record last seen");
            }
        }
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        let connections = self.connections.read().await;
        connections
            .get(&user_id)
            .map(|v| !v.is_empty())
            .unwrap_or(false)
    }

    /// Handles currently registered for a user; empty if offline
    pub async fn handles_for(&self, user_id: Uuid) -> Vec<ConnectionId> {
        let connections = self.connections.read().await;
        connections
            .get(&user_id)
            .map(|v| v.iter().map(|c| c.id).collect())
            .unwrap_or_default()
    }

    pub async fn connection_count(&self, user_id: Uuid) -> usize {
        let connections = self.connections.read().await;
        connections.get(&user_id).map(|v| v.len()).unwrap_or(0)
    }

    pub async fn total_connections(&self) -> usize {
        let connections = self.connections.read().await;
        connections.values().map(|v| v.len()).sum()
    }

    pub async fn connected_users_count(&self) -> usize {
        let connections = self.connections.read().await;
        connections.len()
    }

    /// Oldest registration time among a user's live handles, if any
    pub async fn connected_since(&self, user_id: Uuid) -> Option<chrono::DateTime<chrono::Utc>> {
        let connections = self.connections.read().await;
        connections
            .get(&user_id)
            .and_then(|v| v.iter().map(|c| c.connected_at).min())
    }

    /// Send one event to every live handle of a user. A handle whose peer
    /// vanished between the liveness check and the write is skipped; its
    /// siblings still receive the event. Returns handles reached.
    pub async fn deliver(&self, user_id: Uuid, event: &ServerEvent) -> usize {
        let connections = self.connections.read().await;

        match connections.get(&user_id) {
            Some(entries) => entries
                .iter()
                .filter(|c| c.sender.send(event.clone()).is_ok())
                .count(),
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppResult;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct RecordingLastSeen {
        seen: Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl LastSeenStore for RecordingLastSeen {
        async fn record_last_seen(&self, user_id: Uuid, _seen_at: DateTime<Utc>) -> AppResult<()> {
            self.seen.lock().unwrap().push(user_id);
            Ok(())
        }
    }

    fn registry() -> (ConnectionRegistry, Arc<RecordingLastSeen>) {
        let store = Arc::new(RecordingLastSeen::default());
        (ConnectionRegistry::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_register_marks_user_online() {
        let (registry, _) = registry();
        let user_id = Uuid::new_v4();
        let (tx, _rx) = mpsc::unbounded_channel();

        assert!(!registry.is_online(user_id).await);
        registry.register(user_id, ConnectionId::new(), tx).await;

        assert!(registry.is_online(user_id).await);
        assert_eq!(registry.connection_count(user_id).await, 1);
        assert!(registry.connected_since(user_id).await.is_some());
    }

    #[tokio::test]
    async fn test_multiple_connections_same_user() {
        let (registry, _) = registry();
        let user_id = Uuid::new_v4();

        for _ in 0..3 {
            let (tx, _rx) = mpsc::unbounded_channel();
            registry.register(user_id, ConnectionId::new(), tx).await;
        }

        assert_eq!(registry.connection_count(user_id).await, 3);
        assert_eq!(registry.handles_for(user_id).await.len(), 3);
        assert_eq!(registry.connected_users_count().await, 1);
        assert_eq!(registry.total_connections().await, 3);
    }

    #[tokio::test]
    async fn test_repeated_register_same_handle_is_idempotent() {
        let (registry, _) = registry();
        let user_id = Uuid::new_v4();
        let connection_id = ConnectionId::new();

        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        registry.register(user_id, connection_id, tx1).await;
        registry.register(user_id, connection_id, tx2).await;

        assert_eq!(registry.connection_count(user_id).await, 1);
    }

    #[tokio::test]
    async fn test_unregister_removes_exactly_one_handle() {
        let (registry, store) = registry();
        let user_id = Uuid::new_v4();
        let first = ConnectionId::new();
        let second = ConnectionId::new();

        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        registry.register(user_id, first, tx1).await;
        registry.register(user_id, second, tx2).await;

        registry.unregister(user_id, first).await;

        assert!(registry.is_online(user_id).await);
        assert_eq!(registry.handles_for(user_id).await, vec![second]);
        // still one handle left, no offline transition yet
        assert!(store.seen.lock().unwrap().is_empty());

        registry.unregister(user_id, second).await;
        assert!(!registry.is_online(user_id).await);
        assert_eq!(store.seen.lock().unwrap().as_slice(), &[user_id]);
    }

    #[tokio::test]
    async fn test_duplicate_unregister_is_noop() {
        let (registry, store) = registry();
        let user_id = Uuid::new_v4();
        let connection_id = ConnectionId::new();

        let (tx, _rx) = mpsc::unbounded_channel();
        registry.register(user_id, connection_id, tx).await;

        registry.unregister(user_id, connection_id).await;
        registry.unregister(user_id, connection_id).await;
        registry.unregister(Uuid::new_v4(), ConnectionId::new()).await;

        assert!(!registry.is_online(user_id).await);
        // offline side effect fired exactly once
        assert_eq!(store.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_online_iff_handles_nonempty() {
        let (registry, _) = registry();
        let user_id = Uuid::new_v4();
        let a = ConnectionId::new();
        let b = ConnectionId::new();

        // arbitrary interleaving, including a bogus unregister up front
        registry.unregister(user_id, a).await;
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.register(user_id, a, tx).await;
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.register(user_id, b, tx).await;
        registry.unregister(user_id, b).await;
        registry.unregister(user_id, b).await;

        assert_eq!(
            registry.is_online(user_id).await,
            !registry.handles_for(user_id).await.is_empty()
        );

        registry.unregister(user_id, a).await;
        assert_eq!(
            registry.is_online(user_id).await,
            !registry.handles_for(user_id).await.is_empty()
        );
        assert!(!registry.is_online(user_id).await);
    }

    #[tokio::test]
    async fn test_deliver_reaches_all_live_handles() {
        let (registry, _) = registry();
        let user_id = Uuid::new_v4();

        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        registry.register(user_id, ConnectionId::new(), tx1).await;
        registry.register(user_id, ConnectionId::new(), tx2).await;

        let event = ServerEvent::room_joined(Uuid::new_v4(), user_id);
        let reached = registry.deliver(user_id, &event).await;

        assert_eq!(reached, 2);
        assert_eq!(rx1.recv().await.unwrap(), event);
        assert_eq!(rx2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_deliver_skips_dead_handle_without_aborting() {
        let (registry, _) = registry();
        let user_id = Uuid::new_v4();

        let (tx_dead, rx_dead) = mpsc::unbounded_channel();
        drop(rx_dead);
        let (tx_live, mut rx_live) = mpsc::unbounded_channel();
        registry.register(user_id, ConnectionId::new(), tx_dead).await;
        registry.register(user_id, ConnectionId::new(), tx_live).await;

        let event = ServerEvent::welcome();
        let reached = registry.deliver(user_id, &event).await;

        assert_eq!(reached, 1);
        assert!(rx_live.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_deliver_to_offline_user_is_zero() {
        let (registry, _) = registry();
        let reached = registry
            .deliver(Uuid::new_v4(), &ServerEvent::welcome())
            .await;
        assert_eq!(reached, 0);
    }
}
