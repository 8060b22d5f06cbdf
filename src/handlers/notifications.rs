/// Notification endpoints for domain collaborators
///
/// Every collaborator that produces a user-facing event (task assignment,
/// complaint status change, chat message, announcement) posts an envelope
/// here. Title/body default from the kind's template when omitted.
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{EventKind, NotificationEnvelope, NotificationTarget};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct NotifyRequest {
    pub target: NotificationTarget,
    pub kind: EventKind,
    pub actor_id: Option<Uuid>,
    /// Domain entity the event is about; scopes deduplication
    pub object_id: Uuid,
    pub title: Option<String>,
    pub body: Option<String>,
    pub data: Option<serde_json::Value>,
}

impl NotifyRequest {
    fn into_envelope(self) -> NotificationEnvelope {
        let mut envelope =
            NotificationEnvelope::new(self.kind, self.target, self.actor_id, self.object_id);
        if let Some(title) = self.title {
            envelope = envelope.with_title(title);
        }
        if let Some(body) = self.body {
            envelope = envelope.with_body(body);
        }
        if let Some(data) = self.data {
            envelope = envelope.with_data(data);
        }
        envelope
    }
}

/// Dispatch and report the delivery summary
///
/// Endpoint: POST /api/v1/notifications
pub async fn notify(
    state: web::Data<AppState>,
    body: web::Json<NotifyRequest>,
) -> Result<HttpResponse, AppError> {
    let summary = state.coordinator.notify(body.into_inner().into_envelope()).await?;
    Ok(HttpResponse::Ok().json(summary))
}

/// Fire-and-forget variant: the triggering operation (create task, file a
/// complaint) must succeed independently of notification outcome.
///
/// Endpoint: POST /api/v1/notifications/background
pub async fn notify_background(
    state: web::Data<AppState>,
    body: web::Json<NotifyRequest>,
) -> HttpResponse {
    state
        .coordinator
        .notify_background(body.into_inner().into_envelope());
    HttpResponse::Accepted().finish()
}

/// Register notification routes
pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1/notifications")
            .route("", web::post().to(notify))
            .route("/background", web::post().to(notify_background)),
    );
}
