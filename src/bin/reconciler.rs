use anyhow::Result;
use payments_orchestrator::config::AppConfig;
use payments_orchestrator::gateways;
use payments_orchestrator::repo::idempotency_repo::IdempotencyRepo;
use payments_orchestrator::repo::sessions_repo::SessionsRepo;
use payments_orchestrator::service::provider_router::ProviderRouter;
use payments_orchestrator::service::reconciler::Reconciler;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = Arc::new(AppConfig::from_env()?);
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&cfg.database_url)
        .await?;

    let sessions = Arc::new(SessionsRepo { pool: pool.clone() });
    let orders = Arc::new(IdempotencyRepo { pool });
    let router = ProviderRouter::new(cfg.clone(), gateways::from_config(&cfg), sessions.clone());
    let reconciler = Reconciler::new(cfg.clone(), sessions, orders, router);

    tracing::info!(
        stuck_minutes = cfg.reconcile_stuck_minutes,
        max_sessions = cfg.reconcile_max_sessions,
        "reconciler started"
    );
    reconciler
        .run_forever(std::time::Duration::from_secs(cfg.reconcile_interval_secs))
        .await;
    Ok(())
}
