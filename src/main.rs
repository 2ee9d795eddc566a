use std::sync::Arc;
use std::time::Duration;

use actix_web::{middleware::Logger, web, App, HttpResponse, HttpServer};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use realtime_delivery_service::broker::BrokerGateway;
use realtime_delivery_service::config::Config;
use realtime_delivery_service::dispatch::NotificationDispatcher;
use realtime_delivery_service::handlers;
use realtime_delivery_service::metrics;
use realtime_delivery_service::registry::ConnectionRegistry;
use realtime_delivery_service::scheduler::RetentionScheduler;
use realtime_delivery_service::state::AppState;
use realtime_delivery_service::store::{AlarmStore, ChatStore, PgAlarmStore, PgChatStore};

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new("info,actix_web=info,sqlx=warn")
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    info!(env = %config.app.env, port = config.app.port, "starting realtime delivery service");

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let alarms: Arc<dyn AlarmStore> = Arc::new(PgAlarmStore::new(pool.clone()));
    let chats: Arc<dyn ChatStore> = Arc::new(PgChatStore::new(pool.clone()));
    let registry = Arc::new(ConnectionRegistry::new());
    let dispatcher = Arc::new(NotificationDispatcher::new(
        alarms.clone(),
        chats.clone(),
        registry.clone(),
    ));

    let gateway = BrokerGateway::new(config.broker.clone())?;
    gateway.init_chat_listener(dispatcher.clone());
    gateway.init_alarm_listener(dispatcher.clone());

    RetentionScheduler::new(alarms.clone(), &config.retention).spawn();

    let state = AppState {
        alarms,
        chats,
        registry,
        publisher: gateway.publisher(),
        dispatcher,
        keep_alive: Duration::from_secs(config.delivery.keep_alive_secs),
    };

    let port = config.app.port;
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(Logger::default())
            .route("/health", web::get().to(health))
            .route("/metrics", web::get().to(metrics::serve_metrics))
            .configure(handlers::register)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await?;

    Ok(())
}
