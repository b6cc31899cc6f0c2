use crate::config::AppConfig;
use crate::domain::session::{OrderRequest, PaymentSession, ProviderOrder};
use crate::domain::status::PaymentSessionStatus;
use crate::error::PaymentError;
use crate::upstream::{RetryPolicy, UpstreamCaller};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

pub mod mock;
pub mod razorpay;

/// What the provider currently reports for a session, normalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub status: PaymentSessionStatus,
    pub raw_status: String,
    pub provider_payment_id: Option<String>,
    pub provider_order_id: Option<String>,
    /// Provider-native fields to merge into the session data blob.
    pub refs: Map<String, Value>,
}

/// Upstream REST adapter for one provider. Every network call inside an
/// implementation goes through [`crate::upstream::UpstreamCaller`].
#[async_trait::async_trait]
pub trait PaymentGateway: Send + Sync {
    fn id(&self) -> &str;

    /// Empty means any currency.
    fn supported_currencies(&self) -> &[&'static str] {
        &[]
    }

    fn supports_refunds(&self) -> bool {
        true
    }

    fn supports_currency(&self, currency: &str) -> bool {
        let supported = self.supported_currencies();
        supported.is_empty() || supported.iter().any(|c| c.eq_ignore_ascii_case(currency))
    }

    /// Creates the upstream order and returns its id. Only ever called by
    /// the idempotency store while it holds the session's order lock.
    async fn create_order(&self, request: &OrderRequest) -> Result<String, PaymentError>;

    async fn fetch_status(&self, correlation_id: &str, order: &ProviderOrder) -> Result<ProviderStatus, PaymentError>;

    async fn capture(
        &self,
        correlation_id: &str,
        session: &PaymentSession,
        order: &ProviderOrder,
    ) -> Result<ProviderStatus, PaymentError>;

    async fn refund(
        &self,
        correlation_id: &str,
        session: &PaymentSession,
        order: &ProviderOrder,
        amount_minor: i64,
    ) -> Result<ProviderStatus, PaymentError>;

    /// Providers without an order-cancel API cancel locally only.
    async fn cancel(
        &self,
        _correlation_id: &str,
        _session: &PaymentSession,
        order: Option<&ProviderOrder>,
    ) -> Result<ProviderStatus, PaymentError> {
        Ok(ProviderStatus {
            status: PaymentSessionStatus::Cancelled,
            raw_status: "cancelled".to_string(),
            provider_payment_id: None,
            provider_order_id: order.map(|o| o.provider_order_id.clone()),
            refs: Map::new(),
        })
    }
}

/// Adapters available to the router, built once at startup.
pub fn from_config(cfg: &AppConfig) -> Vec<Arc<dyn PaymentGateway>> {
    let caller = UpstreamCaller::new(RetryPolicy::from_config(cfg));
    vec![
        Arc::new(razorpay::RazorpayGateway::new(
            &cfg.razorpay_base_url,
            &cfg.razorpay_key_id,
            &cfg.razorpay_key_secret,
            cfg.gateway_timeout_ms,
            caller.clone(),
        )),
        Arc::new(mock::MockGateway::new("mock", caller)),
    ]
}
