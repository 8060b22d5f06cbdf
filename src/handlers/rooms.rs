/// Room membership endpoints
///
/// Called by the chat collaborator when a thread is created or archived, and
/// opportunistically when a user acts in a thread they have not yet joined
/// (auto-join on activity). Membership is independent of connection state.
use actix_web::{web, HttpResponse, Result as ActixResult};
use serde_json::json;
use uuid::Uuid;

use crate::state::AppState;
use crate::websocket::ServerEvent;

/// Endpoint: POST /api/v1/rooms/{room_id}/members/{user_id}
pub async fn join_room(
    path: web::Path<(Uuid, Uuid)>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let (room_id, user_id) = path.into_inner();

    state.rooms.join(user_id, room_id).await;
    state
        .broadcaster
        .send_to_room(room_id, ServerEvent::room_joined(room_id, user_id))
        .await;

    Ok(HttpResponse::Ok().json(json!({
        "room_id": room_id.to_string(),
        "user_id": user_id.to_string(),
        "member_count": state.rooms.member_count(room_id).await,
    })))
}

/// Endpoint: DELETE /api/v1/rooms/{room_id}/members/{user_id}
pub async fn leave_room(
    path: web::Path<(Uuid, Uuid)>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let (room_id, user_id) = path.into_inner();

    state.rooms.leave(user_id, room_id).await;
    state
        .broadcaster
        .send_to_room(room_id, ServerEvent::room_left(room_id, user_id))
        .await;

    Ok(HttpResponse::Ok().json(json!({
        "room_id": room_id.to_string(),
        "user_id": user_id.to_string(),
        "member_count": state.rooms.member_count(room_id).await,
    })))
}

/// Endpoint: GET /api/v1/rooms/{room_id}/members
pub async fn room_members(
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let room_id = path.into_inner();
    let members = state.rooms.members_of(room_id).await;

    let mut online = 0;
    for member in &members {
        if state.connections.is_online(*member).await {
            online += 1;
        }
    }

    Ok(HttpResponse::Ok().json(json!({
        "room_id": room_id.to_string(),
        "members": members.iter().map(|m| m.to_string()).collect::<Vec<_>>(),
        "online_count": online,
    })))
}

/// Register room routes
pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1/rooms")
            .route("/{room_id}/members/{user_id}", web::post().to(join_room))
            .route("/{room_id}/members/{user_id}", web::delete().to(leave_room))
            .route("/{room_id}/members", web::get().to(room_members)),
    );
}
