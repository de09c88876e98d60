use anyhow::Result;
use payment_orchestrator::build_registry;
use payment_orchestrator::config::AppConfig;
use payment_orchestrator::repo::notifications_repo::NotificationsRepo;
use payment_orchestrator::service::notification_dispatcher::NotificationDispatcher;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Runs only the notification dispatcher, for deployments that keep it apart from the API.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&cfg.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let dispatcher = NotificationDispatcher::new(
        Arc::new(NotificationsRepo { pool }),
        build_registry(&cfg),
        cfg.notifications.clone(),
        cfg.webhook_timeout_ms,
    )?;
    dispatcher.run().await;
    Ok(())
}
