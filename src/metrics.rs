use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, TextEncoder};

static NOTIFICATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "presence_service_notifications_total",
            "Notification envelopes handled by the coordinator, by outcome",
        ),
        &["kind", "outcome"],
    )
    .expect("failed to create presence_service_notifications_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register presence_service_notifications_total");
    counter
});

static PUSH_RESULTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "presence_service_push_results_total",
            "Per-device push results as acknowledged by the provider",
        ),
        &["result"],
    )
    .expect("failed to create presence_service_push_results_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register presence_service_push_results_total");
    counter
});

static WS_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "presence_service_ws_connections",
        "Live WebSocket connections",
    )
    .expect("failed to create presence_service_ws_connections");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register presence_service_ws_connections");
    gauge
});

pub fn observe_notification(kind: &str, outcome: &str) {
    NOTIFICATIONS_TOTAL.with_label_values(&[kind, outcome]).inc();
}

pub fn observe_push(success: usize, failed: usize) {
    if success > 0 {
        PUSH_RESULTS_TOTAL
            .with_label_values(&["ok"])
            .inc_by(success as u64);
    }
    if failed > 0 {
        PUSH_RESULTS_TOTAL
            .with_label_values(&["failed"])
            .inc_by(failed as u64);
    }
}

pub fn connection_opened() {
    WS_CONNECTIONS.inc();
}

pub fn connection_closed() {
    WS_CONNECTIONS.dec();
}

pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
