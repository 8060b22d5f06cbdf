/// Notification coordinator
///
/// The single entry point that turns a domain event into deliveries across
/// both channels. One `notify` call walks a strictly linear lifecycle:
/// Created -> RateChecked -> {Dropped | Dispatched} -> Completed. Nothing is
/// queued, retried or persisted; a process restart mid-dispatch loses the
/// notification, per the delivery contract.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::directory::UserDirectory;
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::{
    DeliverySummary, EventKind, NotificationEnvelope, NotificationTarget,
};
use crate::services::rate_limit::{RateLimiter, RatePolicy};
use crate::services::{Broadcaster, PushDispatcher};
use crate::websocket::ServerEvent;

/// How many dedupe keys to hold before lazily evicting expired ones
const DEDUPE_SWEEP_THRESHOLD: usize = 1024;

pub struct NotificationCoordinator {
    users: Arc<dyn UserDirectory>,
    broadcaster: Broadcaster,
    push: PushDispatcher,
    limiter: RateLimiter,
    /// Kinds without a policy are never rate-limited
    policies: HashMap<EventKind, RatePolicy>,
    dedupe_ttl: Duration,
    recent: Mutex<HashMap<String, Instant>>,
}

impl NotificationCoordinator {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        broadcaster: Broadcaster,
        push: PushDispatcher,
        dedupe_ttl: Duration,
    ) -> Self {
        Self {
            users,
            broadcaster,
            push,
            limiter: RateLimiter::new(),
            policies: HashMap::new(),
            dedupe_ttl,
            recent: Mutex::new(HashMap::new()),
        }
    }

    /// Opt a kind into rate limiting
    pub fn with_policy(mut self, kind: EventKind, policy: RatePolicy) -> Self {
        self.policies.insert(kind, policy);
        self
    }

    /// Dispatch one domain event across both channels.
    ///
    /// Both channels are attempted for every recipient regardless of the
    /// other's outcome; a user can be online on one device and offline on
    /// another at the same time. Partial failure never raises. The only
    /// error condition is an envelope targeting a user id that does not
    /// exist.
    pub async fn notify(&self, envelope: NotificationEnvelope) -> AppResult<DeliverySummary> {
        if !self.first_sighting(&envelope.dedupe_key) {
            debug!(dedupe_key = %envelope.dedupe_key, "duplicate envelope collapsed");
            metrics::observe_notification(envelope.kind.as_str(), "duplicate");
            return Ok(DeliverySummary::duplicate());
        }

        if let Some(policy) = self.policies.get(&envelope.kind) {
            let subject = subject_key(envelope.kind, envelope.actor_id);
            if self.limiter.check(&subject, *policy).is_limited() {
                info!(%subject, "notification dropped by rate limit");
                metrics::observe_notification(envelope.kind.as_str(), "rate_limited");
                return Ok(DeliverySummary::rate_limited());
            }
        }

        let summary = match envelope.target {
            NotificationTarget::User(user_id) => {
                if !self.users.exists(user_id).await? {
                    return Err(AppError::UnknownRecipient(user_id));
                }

                let event = socket_event(&envelope, None);
                let (delivered, push) = tokio::join!(
                    self.broadcaster.send_to_user(user_id, event),
                    self.push.dispatch(
                        user_id,
                        &envelope.title,
                        &envelope.body,
                        envelope.data.clone()
                    ),
                );

                DeliverySummary::dispatched(
                    usize::from(delivered),
                    push.success_count,
                    push.total_count,
                )
            }

            NotificationTarget::Room(room_id) => {
                let members = self.broadcaster.rooms().members_of(room_id).await;

                // the actor does not get pushed their own event
                let push_targets: Vec<Uuid> = members
                    .into_iter()
                    .filter(|m| Some(*m) != envelope.actor_id)
                    .collect();

                let event = socket_event(&envelope, Some(room_id));
                let (socket_delivered, outcomes) = tokio::join!(
                    self.broadcaster.send_to_room(room_id, event),
                    futures::future::join_all(push_targets.iter().map(|member| {
                        self.push.dispatch(
                            *member,
                            &envelope.title,
                            &envelope.body,
                            envelope.data.clone(),
                        )
                    })),
                );

                let (push_success, push_total) = outcomes
                    .iter()
                    .fold((0, 0), |acc, o| (acc.0 + o.success_count, acc.1 + o.total_count));

                DeliverySummary::dispatched(socket_delivered, push_success, push_total)
            }
        };

        metrics::observe_notification(envelope.kind.as_str(), "dispatched");
        debug!(
            kind = envelope.kind.as_str(),
            socket = summary.socket_delivered,
            push_ok = summary.push_success,
            push_total = summary.push_total,
            "notification dispatched"
        );

        Ok(summary)
    }

    /// Fire-and-forget contract: completion is observable through the
    /// returned handle (tests await it), but failure is logged and never
    /// propagated to the triggering request.
    pub fn notify_background(self: &Arc<Self>, envelope: NotificationEnvelope) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            match coordinator.notify(envelope).await {
                Ok(summary) => debug!(?summary, "background notification completed"),
                Err(e) => warn!(error = %e, "background notification failed"),
            }
        })
    }

    /// Claims a dedupe key: true exactly once per key per TTL, so concurrent
    /// attempts for the same logical event collapse into one rate-limit
    /// decision. Expired keys are evicted lazily, no background sweep.
    fn first_sighting(&self, key: &str) -> bool {
        let mut recent = self.recent.lock().unwrap_or_else(|p| p.into_inner());

        if recent.len() >= DEDUPE_SWEEP_THRESHOLD {
            let ttl = self.dedupe_ttl;
            recent.retain(|_, seen_at| seen_at.elapsed() < ttl);
        }

        match recent.get(key) {
            Some(seen_at) if seen_at.elapsed() < self.dedupe_ttl => false,
            _ => {
                recent.insert(key.to_string(), Instant::now());
                true
            }
        }
    }
}

fn subject_key(kind: EventKind, actor_id: Option<Uuid>) -> String {
    match actor_id {
        Some(actor) => format!("{}:{}", kind.as_str(), actor),
        None => format!("{}:system", kind.as_str()),
    }
}

/// Chat messages land as `new_message` on the room; everything else is a
/// `new_notification`.
fn socket_event(envelope: &NotificationEnvelope, room_id: Option<Uuid>) -> ServerEvent {
    match (envelope.kind, room_id) {
        (EventKind::ChatMessage, Some(room_id)) => ServerEvent::new_message(
            room_id,
            envelope.actor_id,
            envelope
                .data
                .clone()
                .unwrap_or_else(|| serde_json::json!({ "body": envelope.body })),
        ),
        _ => ServerEvent::new_notification(
            envelope.kind.as_str(),
            &envelope.title,
            &envelope.body,
            envelope.data.clone(),
        ),
    }
}
