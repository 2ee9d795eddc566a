use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, TextEncoder};

static EVENTS_PERSISTED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "realtime_delivery_events_persisted_total",
            "Broker events persisted to the store, by kind",
        ),
        &["kind"],
    )
    .expect("failed to create realtime_delivery_events_persisted_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register realtime_delivery_events_persisted_total");
    counter
});

static EVENTS_DELIVERED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "realtime_delivery_events_delivered_total",
            "Push frames delivered to live connections, by kind",
        ),
        &["kind"],
    )
    .expect("failed to create realtime_delivery_events_delivered_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register realtime_delivery_events_delivered_total");
    counter
});

static EVENTS_DEAD_LETTERED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "realtime_delivery_events_dead_lettered_total",
            "Events routed to a dead-letter topic after exhausted retries",
        ),
        &["topic"],
    )
    .expect("failed to create realtime_delivery_events_dead_lettered_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register realtime_delivery_events_dead_lettered_total");
    counter
});

static ACTIVE_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "realtime_delivery_active_connections",
        "Currently registered push connections",
    )
    .expect("failed to create realtime_delivery_active_connections");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register realtime_delivery_active_connections");
    gauge
});

pub fn inc_persisted(kind: &str) {
    EVENTS_PERSISTED_TOTAL.with_label_values(&[kind]).inc();
}

pub fn add_delivered(kind: &str, n: usize) {
    EVENTS_DELIVERED_TOTAL
        .with_label_values(&[kind])
        .inc_by(n as u64);
}

pub fn inc_dead_lettered(topic: &str) {
    EVENTS_DEAD_LETTERED_TOTAL.with_label_values(&[topic]).inc();
}

pub fn set_active_connections(n: usize) {
    ACTIVE_CONNECTIONS.set(n as i64);
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
