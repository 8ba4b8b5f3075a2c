use reconciliation_engine::api::{create_router, AppState};
use reconciliation_engine::cache::{ListCache, RedisListCache};
use reconciliation_engine::config::{Settings, StorageBackend};
use reconciliation_engine::error::AppError;
use reconciliation_engine::events::{EventProducer, EventPublisher, NoopPublisher, ProducerConfig};
use reconciliation_engine::observability::{init_logging, init_metrics, HealthChecker, LogConfig};
use reconciliation_engine::repositories::{
    AccountRepository, BankTransactionRepository, InMemoryStore, PgAccountRepository,
    PgBankTransactionRepository,
};
use reconciliation_engine::services::ReconciliationService;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let settings = Settings::new().map_err(AppError::Config)?;

    // Initialize logging
    init_logging(&LogConfig::from_settings(&settings.application))?;
    info!("Configuration loaded");

    let metrics_handle = init_metrics()?;

    // Storage
    let (transactions, accounts, pool) = match settings.storage.backend {
        StorageBackend::Postgres => {
            info!("Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(settings.database.pool_size)
                .acquire_timeout(Duration::from_secs(5))
                .connect(&settings.database.url)
                .await
                .map_err(AppError::Database)?;
            info!("Database connection established");

            info!("Running database migrations...");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(AppError::Migration)?;
            info!("Migrations applied successfully");

            let transactions: Arc<dyn BankTransactionRepository> =
                Arc::new(PgBankTransactionRepository::new(pool.clone()));
            let accounts: Arc<dyn AccountRepository> = Arc::new(PgAccountRepository::new(pool.clone()));
            (transactions, accounts, Some(pool))
        }
        StorageBackend::Memory => {
            warn!("Using the in-memory store; data is lost on shutdown");
            let store = Arc::new(InMemoryStore::new());
            let transactions: Arc<dyn BankTransactionRepository> = store.clone();
            let accounts: Arc<dyn AccountRepository> = store;
            (transactions, accounts, None)
        }
    };

    // List cache; a disabled cache never touches Redis
    let redis_client = redis::Client::open(settings.redis.url.as_str()).map_err(AppError::Redis)?;
    let cache: Arc<dyn ListCache> = Arc::new(RedisListCache::new(
        redis_client.clone(),
        settings.cache.clone(),
    ));

    // Audit events
    let (events, kafka_connected): (Arc<dyn EventPublisher>, Option<bool>) = if settings.kafka.enabled {
        let mut producer = EventProducer::new(ProducerConfig::from(&settings.kafka));
        match producer.connect().await {
            Ok(()) => (Arc::new(producer) as Arc<dyn EventPublisher>, Some(true)),
            Err(e) => {
                warn!("Kafka unavailable, events will be dropped: {}", e);
                (Arc::new(NoopPublisher) as Arc<dyn EventPublisher>, Some(false))
            }
        }
    } else {
        (Arc::new(NoopPublisher) as Arc<dyn EventPublisher>, None)
    };

    let service = ReconciliationService::new(
        transactions,
        accounts,
        cache,
        events,
        settings.reconciliation.clone(),
    )?;

    let health_checker = HealthChecker::new(
        pool,
        settings.cache.enabled.then_some(redis_client),
        kafka_connected,
    );

    let state = AppState::new(Arc::new(service), Arc::new(health_checker)).with_metrics(metrics_handle);
    let app = create_router(state);

    let addr = format!("{}:{}", settings.application.host, settings.application.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Reconciliation engine listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
