use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Domain event kinds that produce user-facing notifications
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Message posted in a 1:1 or group chat thread
    ChatMessage,
    /// Company-wide or targeted announcement
    Announcement,
    /// Task assigned to an employee
    TaskAssigned,
    /// Task moved to a new status
    TaskStatusChanged,
    /// Complaint status changed
    ComplaintStatusChanged,
    /// Employee suggestion ("saran") submitted
    Suggestion,
    /// Financial entry recorded
    FinanceEntryCreated,
    /// HR red/blue team assignment changed
    TeamAssignment,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ChatMessage => "chat_message",
            EventKind::Announcement => "announcement",
            EventKind::TaskAssigned => "task_assigned",
            EventKind::TaskStatusChanged => "task_status_changed",
            EventKind::ComplaintStatusChanged => "complaint_status_changed",
            EventKind::Suggestion => "suggestion",
            EventKind::FinanceEntryCreated => "finance_entry_created",
            EventKind::TeamAssignment => "team_assignment",
        }
    }

    /// Default presentation per kind. Envelopes may override both fields for
    /// kinds that carry real content (chat preview, announcement text).
    pub fn default_title(&self) -> &'static str {
        match self {
            EventKind::ChatMessage => "New message",
            EventKind::Announcement => "Announcement",
            EventKind::TaskAssigned => "Task assigned",
            EventKind::TaskStatusChanged => "Task updated",
            EventKind::ComplaintStatusChanged => "Complaint updated",
            EventKind::Suggestion => "New suggestion",
            EventKind::FinanceEntryCreated => "Finance entry recorded",
            EventKind::TeamAssignment => "Team assignment updated",
        }
    }

    pub fn default_body(&self) -> &'static str {
        match self {
            EventKind::ChatMessage => "You have a new chat message",
            EventKind::Announcement => "A new announcement was published",
            EventKind::TaskAssigned => "A task was assigned to you",
            EventKind::TaskStatusChanged => "A task you follow changed status",
            EventKind::ComplaintStatusChanged => "A complaint you filed was updated",
            EventKind::Suggestion => "A new suggestion was submitted",
            EventKind::FinanceEntryCreated => "A new financial entry was recorded",
            EventKind::TeamAssignment => "Your team assignment changed",
        }
    }
}

/// Where a notification goes: one user, or every member of a room
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "scope", content = "id", rename_all = "snake_case")]
pub enum NotificationTarget {
    User(Uuid),
    Room(Uuid),
}

impl NotificationTarget {
    fn key_fragment(&self) -> String {
        match self {
            NotificationTarget::User(id) => format!("user:{id}"),
            NotificationTarget::Room(id) => format!("room:{id}"),
        }
    }
}

/// One logical notification event before channel-specific delivery.
/// Transient; never persisted by this service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEnvelope {
    pub target: NotificationTarget,
    pub kind: EventKind,
    /// Acting/sender identity; rate limiting is scoped per (kind, actor)
    pub actor_id: Option<Uuid>,
    pub title: String,
    pub body: String,
    pub data: Option<serde_json::Value>,
    /// Unique per logical event + recipient pair; collapses simultaneous
    /// delivery attempts into one rate-limit decision
    pub dedupe_key: String,
}

impl NotificationEnvelope {
    /// Build an envelope with per-kind default presentation. `object_id` is
    /// the domain entity the event is about (task, thread, complaint, ...)
    /// and scopes the dedupe key to the logical event.
    pub fn new(
        kind: EventKind,
        target: NotificationTarget,
        actor_id: Option<Uuid>,
        object_id: Uuid,
    ) -> Self {
        Self {
            target,
            kind,
            actor_id,
            title: kind.default_title().to_string(),
            body: kind.default_body().to_string(),
            data: None,
            dedupe_key: format!("{}:{}:{}", kind.as_str(), object_id, target.key_fragment()),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Device platform for a registered push token
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DevicePlatform {
    Ios,
    Android,
    Web,
}

impl DevicePlatform {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "ios" => DevicePlatform::Ios,
            "web" => DevicePlatform::Web,
            _ => DevicePlatform::Android,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DevicePlatform::Ios => "ios",
            DevicePlatform::Android => "android",
            DevicePlatform::Web => "web",
        }
    }
}

/// Registered push-capable device. Lifecycle is owned by the external
/// device directory; this service only reads active entries at dispatch
/// time and retires tokens the provider reports as gone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub platform: DevicePlatform,
    pub is_active: bool,
}

/// Terminal state of one `notify` call
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    Dispatched,
    RateLimited,
    Duplicate,
}

impl DispatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchStatus::Dispatched => "dispatched",
            DispatchStatus::RateLimited => "rate_limited",
            DispatchStatus::Duplicate => "duplicate",
        }
    }
}

/// Per-channel delivery counts reported back to the caller.
/// Partial failure is normal and never raises.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliverySummary {
    pub status: DispatchStatus,
    /// Recipients reached over a live duplex connection
    pub socket_delivered: usize,
    /// Device pushes the provider acknowledged
    pub push_success: usize,
    /// Devices a push was attempted for (including malformed tokens)
    pub push_total: usize,
}

impl DeliverySummary {
    pub fn dispatched(socket_delivered: usize, push_success: usize, push_total: usize) -> Self {
        Self {
            status: DispatchStatus::Dispatched,
            socket_delivered,
            push_success,
            push_total,
        }
    }

    pub fn rate_limited() -> Self {
        Self {
            status: DispatchStatus::RateLimited,
            socket_delivered: 0,
            push_success: 0,
            push_total: 0,
        }
    }

    pub fn duplicate() -> Self {
        Self {
            status: DispatchStatus::Duplicate,
            socket_delivered: 0,
            push_success: 0,
            push_total: 0,
        }
    }
}
