use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dairy_billing::{
    api,
    config::Config,
    middleware::AppState,
    services::{NotificationDispatcher, NotificationService},
    storage::{BillingStore, PgStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Загружаем .env файл
    dotenvy::dotenv().ok();

    // Инициализируем логирование
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dairy_billing=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Загружаем конфигурацию
    let config = Config::from_env()?;

    tracing::info!("Starting Dairy Billing...");
    tracing::info!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    tracing::info!("Connected to database successfully");

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Migrations completed");

    let store: Arc<dyn BillingStore> = Arc::new(PgStore::new(pool));
    let notifier: Arc<dyn NotificationDispatcher> =
        Arc::new(NotificationService::new(store.clone(), &config)?);
    let state = AppState::new(store, notifier, config.clone());

    if !state.gateway.is_configured() {
        tracing::warn!("Razorpay credentials not set, online payments disabled");
    }

    // Фоновые задачи
    if config.scheduler.enabled {
        Arc::new(state.scheduler()).spawn();
    } else {
        tracing::info!("Scheduler disabled");
    }

    let app = api::router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Server running on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
