/// WebSocket session handler
///
/// One actor per live connection. The handshake collaborator (API gateway)
/// authenticates upstream and passes the user id; this handler registers the
/// duplex handle, forwards registry events to the peer, accepts join/leave
/// frames, and unregisters on the actor's stop path so the "last seen" side
/// effect fires for abnormal drops as well as clean closes.
use actix::{Actor, ActorContext, AsyncContext, Handler, Message as ActixMessage, StreamHandler};
use actix_web::{get, web, Error, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::state::AppState;
use crate::websocket::{ClientEvent, ConnectionId, ServerEvent};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub user_id: Uuid,
}

// Registry events destined for this peer
#[derive(ActixMessage)]
#[rtype(result = "()")]
struct Outbound(ServerEvent);

struct WsSession {
    user_id: Uuid,
    connection_id: ConnectionId,
    state: AppState,
    hb: Instant,
}

impl WsSession {
    fn new(user_id: Uuid, state: AppState) -> Self {
        Self {
            user_id,
            connection_id: ConnectionId::new(),
            state,
            hb: Instant::now(),
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                tracing::warn!(user_id = %act.user_id, "WebSocket heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

async fn handle_client_event(state: AppState, user_id: Uuid, evt: ClientEvent) {
    match evt {
        ClientEvent::Join { room_id } => {
            state.rooms.join(user_id, room_id).await;
            state
                .broadcaster
                .send_to_room(room_id, ServerEvent::room_joined(room_id, user_id))
                .await;
        }
        ClientEvent::Leave { room_id } => {
            state.rooms.leave(user_id, room_id).await;
            state
                .broadcaster
                .send_to_room(room_id, ServerEvent::room_left(room_id, user_id))
                .await;
        }
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(user_id = %self.user_id, "WebSocket session started");

        self.hb(ctx);

        // Register the duplex handle, greet, then pump registry events into
        // the actor for the lifetime of the connection.
        let state = self.state.clone();
        let user_id = self.user_id;
        let connection_id = self.connection_id;
        let addr = ctx.address();

        actix::spawn(async move {
            let (tx, mut rx) = mpsc::unbounded_channel();
            state.connections.register(user_id, connection_id, tx).await;
            addr.do_send(Outbound(ServerEvent::welcome()));

            while let Some(event) = rx.recv().await {
                addr.do_send(Outbound(event));
            }
        });
    }

    // Fires on clean close and on abnormal drops alike; this is what keeps
    // the registry and the last-seen record honest when the network dies.
    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(user_id = %self.user_id, "WebSocket session stopped");

        let state = self.state.clone();
        let user_id = self.user_id;
        let connection_id = self.connection_id;

        actix::spawn(async move {
            state.connections.unregister(user_id, connection_id).await;
        });
    }
}

impl Handler<Outbound> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: Outbound, ctx: &mut Self::Context) {
        match msg.0.to_json() {
            Ok(text) => ctx.text(text),
            Err(e) => tracing::warn!(error = %e, "failed to serialize outbound event"),
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(evt) => {
                    let state = self.state.clone();
                    let user_id = self.user_id;
                    actix::spawn(async move {
                        handle_client_event(state, user_id, evt).await;
                    });
                }
                Err(e) => {
                    tracing::warn!(user_id = %self.user_id, error = %e, "unrecognized client frame");
                }
            },
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!("Binary WebSocket messages not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::debug!(?reason, "WebSocket close message received");
                ctx.stop();
            }
            _ => {}
        }
    }
}

#[get("/ws")]
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    query: web::Query<WsParams>,
) -> Result<HttpResponse, Error> {
    let params = query.into_inner();
    let session = WsSession::new(params.user_id, state.get_ref().clone());
    ws::start(session, &req, stream)
}

/// Presence status for one user
///
/// Endpoint: GET /api/v1/ws/status/{user_id}
pub async fn ws_status(
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let user_id = path.into_inner();

    let connection_count = state.connections.connection_count(user_id).await;
    let connected_since = state.connections.connected_since(user_id).await;

    Ok(HttpResponse::Ok().json(json!({
        "user_id": user_id.to_string(),
        "online": connection_count > 0,
        "connection_count": connection_count,
        "connected_since": connected_since,
    })))
}

/// Registry-wide connection overview
///
/// Endpoint: GET /api/v1/ws/overview
pub async fn ws_overview(state: web::Data<AppState>) -> ActixResult<HttpResponse> {
    let total_connections = state.connections.total_connections().await;
    let connected_users = state.connections.connected_users_count().await;
    let tracked_rooms = state.rooms.room_count().await;

    Ok(HttpResponse::Ok().json(json!({
        "total_connections": total_connections,
        "connected_users": connected_users,
        "tracked_rooms": tracked_rooms,
    })))
}

/// Register WebSocket routes
pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(ws_handler).service(
        web::scope("/api/v1/ws")
            .route("/status/{user_id}", web::get().to(ws_status))
            .route("/overview", web::get().to(ws_overview)),
    );
}
