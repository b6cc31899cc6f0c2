use payments_orchestrator::config::AppConfig;
use payments_orchestrator::gateways;
use payments_orchestrator::http::routes::router;
use payments_orchestrator::repo::idempotency_repo::IdempotencyRepo;
use payments_orchestrator::repo::memory::InMemoryStore;
use payments_orchestrator::repo::sessions_repo::SessionsRepo;
use payments_orchestrator::AppState;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = Arc::new(AppConfig::from_env()?);

    let state = if cfg.in_memory_store {
        tracing::warn!("IN_MEMORY_STORE is set; state is lost on restart and not shared across instances");
        let store = InMemoryStore::new();
        AppState::new(
            cfg.clone(),
            Arc::new(store.clone()),
            Arc::new(store),
            gateways::from_config(&cfg),
            None,
        )
    } else {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&cfg.database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        AppState::new(
            cfg.clone(),
            Arc::new(SessionsRepo { pool: pool.clone() }),
            Arc::new(IdempotencyRepo { pool: pool.clone() }),
            gateways::from_config(&cfg),
            Some(pool),
        )
    };

    if cfg.reconcile_in_process {
        let interval = std::time::Duration::from_secs(cfg.reconcile_interval_secs);
        tokio::spawn(state.reconciler.clone().run_forever(interval));
        tracing::info!("in-process reconciler every {}s", cfg.reconcile_interval_secs);
    }

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    tracing::info!(
        default_provider = %cfg.default_provider,
        payments_enabled = cfg.payments_enabled,
        "listening on {}",
        cfg.bind_addr
    );
    axum::serve(listener, app).await?;
    Ok(())
}
