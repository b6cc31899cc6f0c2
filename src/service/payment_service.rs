use crate::config::AppConfig;
use crate::domain::payment::{InitiatePaymentResponse, PaymentStatusResponse};
use crate::domain::session::{NewPaymentSession, OrderRequest, PaymentSession, ProviderOrder, StatusUpdate};
use crate::domain::status::{transition, OnInvalid, PaymentSessionStatus};
use crate::error::{ErrorKind, PaymentError};
use crate::gateways::{PaymentGateway, ProviderStatus};
use crate::service::provider_router::{ProviderRouter, ProviderSelection};
use crate::service::status_sync::apply_provider_status;
use crate::store::{IdempotencyStore, OrderCreator, SessionStore};
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct InitiatePayment {
    pub session_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub correlation_id: String,
}

/// Bridges the idempotency store's order lock to the session's adapter.
struct GatewayOrderCreator {
    gateway: Arc<dyn PaymentGateway>,
}

#[async_trait::async_trait]
impl OrderCreator for GatewayOrderCreator {
    async fn create_upstream_order(&self, request: &OrderRequest) -> Result<String, PaymentError> {
        self.gateway.create_order(request).await
    }
}

#[derive(Clone)]
pub struct PaymentService {
    pub config: Arc<AppConfig>,
    pub sessions: Arc<dyn SessionStore>,
    pub orders: Arc<dyn IdempotencyStore>,
    pub router: ProviderRouter,
}

impl PaymentService {
    pub fn new(
        config: Arc<AppConfig>,
        sessions: Arc<dyn SessionStore>,
        orders: Arc<dyn IdempotencyStore>,
        router: ProviderRouter,
    ) -> Self {
        Self {
            config,
            sessions,
            orders,
            router,
        }
    }

    pub async fn initiate_payment(&self, req: InitiatePayment) -> Result<InitiatePaymentResponse, PaymentError> {
        let cid = req.correlation_id.as_str();
        let currency = validate_initiate(&req).map_err(|e| e.with_correlation_id(cid))?;

        let session = match self.sessions.get(&req.session_id).await? {
            Some(existing) => existing,
            None => {
                let selection = self.router.default_provider(cid)?;
                self.sessions
                    .insert_if_absent(NewPaymentSession {
                        id: req.session_id.clone(),
                        provider_id: selection.provider_id,
                        amount_minor: req.amount_minor,
                        currency: currency.clone(),
                        correlation_id: Some(cid.to_string()),
                    })
                    .await?
            }
        };
        let selection = self.router.provider_for(&session, cid)?;

        if !selection.gateway.supports_currency(&currency) {
            return Err(PaymentError::validation(format!(
                "{} does not accept currency {currency}",
                selection.provider_id
            ))
            .with_code("CURRENCY_NOT_SUPPORTED")
            .with_correlation_id(cid));
        }

        let request = OrderRequest {
            session_id: session.id.clone(),
            provider_id: selection.provider_id.clone(),
            amount_minor: req.amount_minor,
            currency: currency.clone(),
            correlation_id: cid.to_string(),
        };
        let creator = GatewayOrderCreator {
            gateway: selection.gateway.clone(),
        };
        let order = self
            .orders
            .create_or_get_order(&request, &creator)
            .await
            .map_err(|e| e.or_correlation_id(cid))?;

        let mut refs = Map::new();
        refs.insert(
            format!("{}_order_id", selection.provider_id),
            Value::String(order.provider_order_id.clone()),
        );
        self.sessions.merge_data(&session.id, &refs).await?;

        tracing::info!(
            correlation_id = cid,
            payment_session_id = %session.id,
            provider = %selection.provider_id,
            provider_order_id = %order.provider_order_id,
            attempt_count = order.attempt_count,
            "payment initiated"
        );

        Ok(InitiatePaymentResponse {
            payment_session_id: session.id,
            provider: selection.provider_id,
            provider_order_id: order.provider_order_id,
            amount_minor: order.amount_minor,
            currency: order.currency,
            status: session.status,
            correlation_id: cid.to_string(),
        })
    }

    /// Polls the provider and applies what it reports; stale reports are absorbed.
    pub async fn authorize_payment(&self, session_id: &str, cid: &str) -> Result<PaymentStatusResponse, PaymentError> {
        let (session, selection, order) = self.load_bound(session_id, cid).await?;
        let reported = selection.gateway.fetch_status(cid, &order).await?;
        let synced = apply_provider_status(self.sessions.as_ref(), &session, &reported, OnInvalid::Noop, cid).await?;
        Ok(PaymentStatusResponse {
            payment_session_id: session.id,
            provider: selection.provider_id,
            status: synced.status(),
            changed: synced.persisted,
            correlation_id: cid.to_string(),
        })
    }

    pub async fn capture_payment(&self, session_id: &str, cid: &str) -> Result<PaymentStatusResponse, PaymentError> {
        let (session, selection, order) = self.load_bound(session_id, cid).await?;
        let outcome = transition(session.status, PaymentSessionStatus::Captured, OnInvalid::Throw, Some(cid))?;
        if outcome.idempotent {
            return Ok(unchanged(&session, &selection, cid));
        }

        let reported = selection.gateway.capture(cid, &session, &order).await?;
        self.commit(&session, &selection, reported, cid).await
    }

    pub async fn refund_payment(
        &self,
        session_id: &str,
        amount_minor: Option<i64>,
        cid: &str,
    ) -> Result<PaymentStatusResponse, PaymentError> {
        let (session, selection, order) = self.load_bound(session_id, cid).await?;
        if !selection.gateway.supports_refunds() {
            return Err(PaymentError::not_supported(format!(
                "{} does not support refunds",
                selection.provider_id
            ))
            .with_correlation_id(cid));
        }

        let amount = amount_minor.unwrap_or(session.amount_minor);
        if amount <= 0 || amount > session.amount_minor {
            return Err(PaymentError::validation(format!(
                "refund amount must be between 1 and {}",
                session.amount_minor
            ))
            .with_correlation_id(cid));
        }

        let outcome = transition(session.status, PaymentSessionStatus::Refunded, OnInvalid::Throw, Some(cid))?;
        if outcome.idempotent {
            return Ok(unchanged(&session, &selection, cid));
        }

        let reported = selection.gateway.refund(cid, &session, &order, amount).await?;
        self.commit(&session, &selection, reported, cid).await
    }

    pub async fn cancel_payment(&self, session_id: &str, cid: &str) -> Result<PaymentStatusResponse, PaymentError> {
        let session = self.load(session_id, cid).await?;
        let selection = self.router.provider_for(&session, cid)?;
        let outcome = transition(session.status, PaymentSessionStatus::Cancelled, OnInvalid::Throw, Some(cid))?;
        if outcome.idempotent {
            return Ok(unchanged(&session, &selection, cid));
        }

        let order = self.orders.find_order_by_session(session_id).await?;
        let reported = selection.gateway.cancel(cid, &session, order.as_ref()).await?;
        self.commit(&session, &selection, reported, cid).await
    }

    pub async fn get_payment_status(&self, session_id: &str, cid: &str) -> Result<PaymentStatusResponse, PaymentError> {
        let session = self.load(session_id, cid).await?;
        Ok(PaymentStatusResponse {
            payment_session_id: session.id,
            provider: session.provider_id,
            status: session.status,
            changed: false,
            correlation_id: cid.to_string(),
        })
    }

    async fn load(&self, session_id: &str, cid: &str) -> Result<PaymentSession, PaymentError> {
        self.sessions.get(session_id).await?.ok_or_else(|| {
            PaymentError::not_found(format!("payment session {session_id} not found")).with_correlation_id(cid)
        })
    }

    async fn load_bound(
        &self,
        session_id: &str,
        cid: &str,
    ) -> Result<(PaymentSession, ProviderSelection, ProviderOrder), PaymentError> {
        let session = self.load(session_id, cid).await?;
        let selection = self.router.provider_for(&session, cid)?;
        let order = self.orders.find_order_by_session(session_id).await?.ok_or_else(|| {
            PaymentError::validation(format!("payment session {session_id} has no upstream order; initiate it first"))
                .with_code("ORDER_NOT_FOUND")
                .with_correlation_id(cid)
        })?;
        Ok((session, selection, order))
    }

    /// Strict write of an operator-driven transition after the upstream call succeeded.
    async fn commit(
        &self,
        session: &PaymentSession,
        selection: &ProviderSelection,
        reported: ProviderStatus,
        cid: &str,
    ) -> Result<PaymentStatusResponse, PaymentError> {
        let outcome = transition(session.status, reported.status, OnInvalid::Throw, Some(cid))?;
        let changed = outcome.changed
            && self
                .sessions
                .update_status(&StatusUpdate {
                    session_id: session.id.clone(),
                    from: outcome.from,
                    to: outcome.to,
                    provider_refs: reported.refs,
                    webhook_received_at: None,
                })
                .await?;

        if outcome.changed && !changed {
            return Err(PaymentError::new(
                ErrorKind::InvalidTransition,
                format!("payment session {} changed status concurrently", session.id),
            )
            .with_code("CONCURRENT_STATUS_CHANGE")
            .with_correlation_id(cid));
        }

        tracing::info!(
            correlation_id = cid,
            payment_session_id = %session.id,
            provider = %selection.provider_id,
            from = outcome.from.as_str(),
            to = outcome.to.as_str(),
            raw_status = %reported.raw_status,
            "payment session status updated"
        );

        Ok(PaymentStatusResponse {
            payment_session_id: session.id.clone(),
            provider: selection.provider_id.clone(),
            status: outcome.resulting_status(),
            changed,
            correlation_id: cid.to_string(),
        })
    }
}

fn unchanged(session: &PaymentSession, selection: &ProviderSelection, cid: &str) -> PaymentStatusResponse {
    PaymentStatusResponse {
        payment_session_id: session.id.clone(),
        provider: selection.provider_id.clone(),
        status: session.status,
        changed: false,
        correlation_id: cid.to_string(),
    }
}

/// Returns the normalized (upper-case) currency.
fn validate_initiate(req: &InitiatePayment) -> Result<String, PaymentError> {
    if req.session_id.trim().is_empty() {
        return Err(PaymentError::validation("payment_session_id is required"));
    }
    if req.amount_minor <= 0 {
        return Err(PaymentError::validation("amount_minor must be > 0")
            .with_details(serde_json::json!({ "amount_minor": req.amount_minor })));
    }
    let currency = req.currency.trim().to_uppercase();
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(PaymentError::validation("currency must be a 3-letter ISO code")
            .with_details(serde_json::json!({ "currency": req.currency })));
    }
    Ok(currency)
}
