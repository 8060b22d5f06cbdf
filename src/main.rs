use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use presence_service::{
    config::Config,
    directory::PgDirectory,
    error::AppError,
    handlers, logging, metrics,
    models::EventKind,
    services::{Broadcaster, ExpoPushClient, NotificationCoordinator, PushDispatcher, RatePolicy},
    state::AppState,
    websocket::{ConnectionRegistry, RoomRegistry},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;

#[actix_web::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    logging::init_tracing();

    let cfg = Arc::new(Config::from_env()?);
    tracing::info!("starting presence-service");

    let db = PgPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .connect(&cfg.database.url)
        .await
        .map_err(|e| AppError::StartServer(format!("db: {e}")))?;
    tracing::info!("connected to database");

    let directory = Arc::new(PgDirectory::new(db.clone()));

    let connections = ConnectionRegistry::new(directory.clone());
    let rooms = RoomRegistry::new();
    let broadcaster = Broadcaster::new(connections.clone(), rooms.clone());

    let expo = Arc::new(ExpoPushClient::new(
        cfg.push.endpoint.clone(),
        cfg.push.receipt_endpoint.clone(),
        cfg.push.batch_size,
    ));
    let push = PushDispatcher::new(directory.clone(), Some(expo))
        .with_receipt_check(Duration::from_secs(cfg.push.receipt_delay_secs));

    let coordinator = Arc::new(
        NotificationCoordinator::new(
            directory.clone(),
            broadcaster.clone(),
            push,
            Duration::from_secs(cfg.limits.dedup_ttl_secs),
        )
        .with_policy(
            EventKind::Suggestion,
            RatePolicy::new(
                cfg.limits.suggestion_limit,
                Duration::from_secs(cfg.limits.suggestion_window_secs),
            ),
        ),
    );

    let state = AppState {
        config: cfg.clone(),
        connections,
        rooms,
        broadcaster,
        coordinator,
    };

    let bind_addr = format!("0.0.0.0:{}", cfg.app.port);
    tracing::info!(%bind_addr, "starting HTTP server");

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(web::Data::new(state.clone()))
            .route("/health", web::get().to(|| async { "OK" }))
            .route("/metrics", web::get().to(metrics::serve_metrics))
            .configure(|c| {
                handlers::websocket::register_routes(c);
                handlers::rooms::register_routes(c);
                handlers::notifications::register_routes(c);
            })
    })
    .bind(&bind_addr)
    .map_err(|e| AppError::StartServer(format!("bind: {e}")))?
    .run()
    .await
    .map_err(|e| AppError::StartServer(format!("server: {e}")))
}
