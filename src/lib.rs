pub mod config;
pub mod domain {
    pub mod context;
    pub mod event;
    pub mod payment;
    pub mod provider_id;
    pub mod session;
    pub mod status;
}
pub mod error;
pub mod gateways;
pub mod http {
    pub mod handlers {
        pub mod ops;
        pub mod payments;
        pub mod webhooks;
    }
    pub mod routes;
}
pub mod repo {
    pub mod idempotency_repo;
    pub mod memory;
    pub mod sessions_repo;
}
pub mod sanitize;
pub mod service {
    pub mod payment_service;
    pub mod provider_router;
    pub mod reconciler;
    pub mod status_sync;
    pub mod webhook_pipeline;
}
pub mod store;
pub mod upstream;
pub mod webhooks;

use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::AppConfig>,
    pub payment_service: service::payment_service::PaymentService,
    pub webhook_pipeline: service::webhook_pipeline::WebhookPipeline,
    pub reconciler: service::reconciler::Reconciler,
    /// `None` when running on the in-memory store.
    pub pool: Option<sqlx::PgPool>,
}

impl AppState {
    pub fn new(
        config: Arc<config::AppConfig>,
        sessions: Arc<dyn store::SessionStore>,
        orders: Arc<dyn store::IdempotencyStore>,
        gateways: Vec<Arc<dyn gateways::PaymentGateway>>,
        pool: Option<sqlx::PgPool>,
    ) -> Self {
        let router = service::provider_router::ProviderRouter::new(config.clone(), gateways, sessions.clone());
        let registry = webhooks::WebhookRegistry::from_config(&config);
        Self {
            payment_service: service::payment_service::PaymentService::new(
                config.clone(),
                sessions.clone(),
                orders.clone(),
                router.clone(),
            ),
            webhook_pipeline: service::webhook_pipeline::WebhookPipeline::new(
                config.clone(),
                registry,
                sessions.clone(),
                orders.clone(),
            ),
            reconciler: service::reconciler::Reconciler::new(config.clone(), sessions, orders, router),
            config,
            pool,
        }
    }
}
