use crate::config::AppConfig;
use crate::domain::provider_id::resolve_provider_id;
use crate::domain::session::PaymentSession;
use crate::error::PaymentError;
use crate::gateways::PaymentGateway;
use crate::store::SessionStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct ProviderSelection {
    pub provider_id: String,
    pub gateway: Arc<dyn PaymentGateway>,
    pub reason: &'static str,
}

impl std::fmt::Debug for ProviderSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSelection")
            .field("provider_id", &self.provider_id)
            .field("reason", &self.reason)
            .finish()
    }
}

/// Picks the adapter for new checkouts and keeps in-flight sessions on the
/// adapter they were created with.
#[derive(Clone)]
pub struct ProviderRouter {
    pub config: Arc<AppConfig>,
    gateways: Vec<Arc<dyn PaymentGateway>>,
    sessions: Arc<dyn SessionStore>,
}

impl ProviderRouter {
    pub fn new(config: Arc<AppConfig>, gateways: Vec<Arc<dyn PaymentGateway>>, sessions: Arc<dyn SessionStore>) -> Self {
        Self {
            config,
            gateways,
            sessions,
        }
    }

    /// Gated by the payments kill switch; nothing external is contacted.
    pub fn default_provider(&self, correlation_id: &str) -> Result<ProviderSelection, PaymentError> {
        if !self.config.payments_enabled {
            return Err(PaymentError::provider_unavailable("payments are disabled by configuration")
                .with_code("PAYMENTS_DISABLED")
                .with_correlation_id(correlation_id));
        }
        self.select(&self.config.default_provider, "default_provider", correlation_id)
    }

    pub async fn provider_for_session(
        &self,
        session_id: &str,
        correlation_id: &str,
    ) -> Result<ProviderSelection, PaymentError> {
        let session = self.sessions.get(session_id).await?.ok_or_else(|| {
            PaymentError::not_found(format!("payment session {session_id} not found"))
                .with_correlation_id(correlation_id)
        })?;
        self.provider_for(&session, correlation_id)
    }

    pub fn provider_for(&self, session: &PaymentSession, correlation_id: &str) -> Result<ProviderSelection, PaymentError> {
        self.select(&session.provider_id, "session_binding", correlation_id)
    }

    pub fn resolve(&self, provider_id: &str) -> Option<Arc<dyn PaymentGateway>> {
        let known: Vec<&str> = self.gateways.iter().map(|g| g.id()).collect();
        let id = resolve_provider_id(provider_id, &known)?;
        self.gateways.iter().find(|g| g.id() == id).cloned()
    }

    fn select(
        &self,
        provider_id: &str,
        reason: &'static str,
        correlation_id: &str,
    ) -> Result<ProviderSelection, PaymentError> {
        let gateway = self.resolve(provider_id).ok_or_else(|| {
            PaymentError::provider_unavailable(format!("no payment provider registered for `{provider_id}`"))
                .with_code("PROVIDER_NOT_CONFIGURED")
                .with_details(serde_json::json!({ "requested_provider": provider_id }))
                .with_correlation_id(correlation_id)
        })?;
        Ok(ProviderSelection {
            provider_id: gateway.id().to_string(),
            gateway,
            reason,
        })
    }
}
