use payment_orchestrator::config::AppConfig;
use payment_orchestrator::http::routes::router;
use payment_orchestrator::repo::aliases_repo::AliasesRepo;
use payment_orchestrator::repo::merchants_repo::MerchantsRepo;
use payment_orchestrator::repo::notifications_repo::NotificationsRepo;
use payment_orchestrator::repo::transactions_repo::TransactionsRepo;
use payment_orchestrator::service::alias_service::AliasService;
use payment_orchestrator::service::notification_dispatcher::NotificationDispatcher;
use payment_orchestrator::service::notification_service::NotificationIngestor;
use payment_orchestrator::service::transaction_service::TransactionOrchestrator;
use payment_orchestrator::{build_registry, AppState};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&cfg.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let registry = build_registry(&cfg);
    let merchants = Arc::new(MerchantsRepo { pool: pool.clone() });
    let aliases = Arc::new(AliasesRepo { pool: pool.clone() });
    let transactions = Arc::new(TransactionsRepo { pool: pool.clone() });
    let notifications = Arc::new(NotificationsRepo { pool: pool.clone() });

    if cfg.notifications.dispatch_enabled {
        let dispatcher = NotificationDispatcher::new(
            notifications.clone(),
            registry.clone(),
            cfg.notifications.clone(),
            cfg.webhook_timeout_ms,
        )?;
        tokio::spawn(dispatcher.run());
    }

    let state = AppState {
        transactions: TransactionOrchestrator::new(
            merchants.clone(),
            aliases.clone(),
            transactions,
            registry.clone(),
        ),
        aliases: AliasService::new(merchants, aliases, registry.clone()),
        notifications: NotificationIngestor::new(notifications, registry),
        pool: Some(pool),
    };

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    tracing::info!("payment orchestrator listening on {}", cfg.bind_addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}
