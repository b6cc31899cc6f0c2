use crate::config::AppConfig;
use crate::domain::provider_id::resolve_provider_id;
use crate::domain::session::StatusUpdate;
use crate::domain::status::{transition, OnInvalid, PaymentSessionStatus};
use crate::error::PaymentError;
use crate::sanitize::Sanitized;
use crate::store::{IdempotencyStore, SessionStore};
use crate::webhooks::{WebhookProvider, WebhookRegistry};
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Bounded re-read when a concurrent writer wins the status compare-and-set.
const MAX_STATUS_WRITE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookResult {
    pub ok: bool,
    pub processed: bool,
    pub deduped: bool,
    pub matched: bool,
    pub changed: bool,
    pub degraded_security: bool,
    pub provider: String,
    pub event_id: String,
    pub event_type: String,
    pub payment_session_id: Option<String>,
    pub status: Option<PaymentSessionStatus>,
    pub correlation_id: String,
}

#[derive(Clone)]
pub struct WebhookPipeline {
    pub config: Arc<AppConfig>,
    pub registry: WebhookRegistry,
    pub sessions: Arc<dyn SessionStore>,
    pub idempotency: Arc<dyn IdempotencyStore>,
}

impl WebhookPipeline {
    pub fn new(
        config: Arc<AppConfig>,
        registry: WebhookRegistry,
        sessions: Arc<dyn SessionStore>,
        idempotency: Arc<dyn IdempotencyStore>,
    ) -> Self {
        Self {
            config,
            registry,
            sessions,
            idempotency,
        }
    }

    pub async fn process_webhook(
        &self,
        provider: &str,
        raw_body: &[u8],
        headers: &HeaderMap,
        correlation_id: &str,
    ) -> Result<WebhookResult, PaymentError> {
        self.process(provider, raw_body, headers, correlation_id)
            .await
            .map_err(|e| e.or_correlation_id(correlation_id))
    }

    async fn process(
        &self,
        provider_id: &str,
        raw_body: &[u8],
        headers: &HeaderMap,
        correlation_id: &str,
    ) -> Result<WebhookResult, PaymentError> {
        let provider = self.registry.resolve(provider_id).ok_or_else(|| {
            PaymentError::not_found(format!("no webhook handler for provider `{provider_id}`"))
                .with_code("WEBHOOK_PROVIDER_UNKNOWN")
                .with_details(serde_json::json!({ "provider": provider_id }))
        })?;

        let degraded_security = self.check_signature(provider.as_ref(), raw_body, headers, correlation_id)?;

        let body: Value = serde_json::from_slice(raw_body)
            .map_err(|e| PaymentError::validation(format!("webhook body is not valid JSON: {e}")))?;
        let mapped = provider.map_event(&body, raw_body, headers).inspect_err(|e| {
            tracing::debug!(
                correlation_id,
                provider = provider.id(),
                code = %e.code,
                payload = %Sanitized(&body),
                "webhook payload could not be mapped"
            )
        })?;
        let event = mapped.event;

        let session_id = match mapped.payment_session_id {
            Some(id) => id,
            None => self.session_from_order(event.provider_order_id.as_deref()).await?,
        };

        let mut result = WebhookResult {
            ok: true,
            processed: false,
            deduped: false,
            matched: false,
            changed: false,
            degraded_security,
            provider: provider.id().to_string(),
            event_id: event.event_id.clone(),
            event_type: event.event_type.clone(),
            payment_session_id: Some(session_id.clone()),
            status: None,
            correlation_id: correlation_id.to_string(),
        };

        let dedupe = self
            .idempotency
            .mark_processed(provider.id(), &event.event_id, &event.event_type)
            .await?;
        if dedupe.already_processed {
            tracing::info!(
                correlation_id,
                provider = provider.id(),
                event_id = %event.event_id,
                "duplicate webhook delivery ignored"
            );
            result.deduped = true;
            return Ok(result);
        }
        result.processed = true;

        let mut session = self.sessions.get(&session_id).await?.ok_or_else(|| {
            PaymentError::validation(format!("webhook references unknown payment session {session_id}"))
                .with_code("PAYMENT_SESSION_NOT_FOUND")
                .with_details(serde_json::json!({ "payment_session_id": session_id }))
        })?;

        if resolve_provider_id(&session.provider_id, &[provider.id()]).is_none() {
            return Err(PaymentError::validation(format!(
                "payment session {session_id} is bound to {}, not {}",
                session.provider_id,
                provider.id()
            ))
            .with_code("PROVIDER_MISMATCH"));
        }
        result.matched = true;

        let refs = provider.to_provider_refs(&event);
        for _ in 0..MAX_STATUS_WRITE_ATTEMPTS {
            let outcome = transition(session.status, event.status, OnInvalid::Noop, Some(correlation_id))?;
            if !outcome.changed {
                if !outcome.valid {
                    tracing::info!(
                        correlation_id,
                        payment_session_id = %session_id,
                        from = outcome.from.as_str(),
                        to = outcome.to.as_str(),
                        "out-of-order webhook absorbed"
                    );
                }
                result.status = Some(session.status);
                return Ok(result);
            }

            let written = self
                .sessions
                .update_status(&StatusUpdate {
                    session_id: session_id.clone(),
                    from: outcome.from,
                    to: outcome.to,
                    provider_refs: refs.clone(),
                    webhook_received_at: Some(chrono::Utc::now()),
                })
                .await?;
            if written {
                tracing::info!(
                    correlation_id,
                    provider = provider.id(),
                    event_id = %event.event_id,
                    payment_session_id = %session_id,
                    from = outcome.from.as_str(),
                    to = outcome.to.as_str(),
                    "payment session status updated from webhook"
                );
                result.changed = true;
                result.status = Some(outcome.to);
                return Ok(result);
            }

            session = self.sessions.get(&session_id).await?.ok_or_else(|| {
                PaymentError::storage(format!("payment session {session_id} vanished during update"))
            })?;
        }

        tracing::error!(
            correlation_id,
            provider = provider.id(),
            event_id = %event.event_id,
            payment_session_id = %session_id,
            "status write kept losing to concurrent writers; event already marked processed"
        );
        Err(PaymentError::storage(format!(
            "payment session {session_id} could not be updated after {MAX_STATUS_WRITE_ATTEMPTS} attempts"
        ))
        .with_code("STATUS_WRITE_CONTENDED")
        .with_details(serde_json::json!({
            "provider": provider.id(),
            "event_id": event.event_id,
            "payment_session_id": session_id,
            "last_seen_status": session.status.as_str(),
            "requested_status": event.status.as_str(),
        }))
        .with_correlation_id(correlation_id))
    }

    /// Returns whether processing continues in degraded-security mode.
    fn check_signature(
        &self,
        provider: &dyn WebhookProvider,
        raw_body: &[u8],
        headers: &HeaderMap,
        correlation_id: &str,
    ) -> Result<bool, PaymentError> {
        let verification = provider.verify_signature(raw_body, headers);
        if verification.verified {
            return Ok(false);
        }

        let code = verification.error_code.unwrap_or(crate::webhooks::SIGNATURE_MISMATCH);
        let message = verification
            .message
            .unwrap_or_else(|| "webhook signature verification failed".to_string());

        if self.config.allow_unverified_webhooks {
            tracing::warn!(
                correlation_id,
                provider = provider.id(),
                reason = code,
                "processing unverified webhook: degraded security"
            );
            return Ok(true);
        }

        Err(PaymentError::signature_invalid(message)
            .with_code(code)
            .with_details(serde_json::json!({ "provider": provider.id() })))
    }

    async fn session_from_order(&self, provider_order_id: Option<&str>) -> Result<String, PaymentError> {
        let missing = || PaymentError::validation("webhook does not reference a payment session")
            .with_code("PAYMENT_SESSION_UNRESOLVED");
        let order_id = provider_order_id.ok_or_else(missing)?;
        let order = self
            .idempotency
            .find_order_by_provider_order_id(order_id)
            .await?
            .ok_or_else(missing)?;
        Ok(order.session_id)
    }
}
