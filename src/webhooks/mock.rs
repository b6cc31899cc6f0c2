use crate::domain::event::CanonicalPaymentEvent;
use crate::domain::status::PaymentSessionStatus;
use crate::error::PaymentError;
use crate::sanitize;
use crate::webhooks::{
    event_id_from, occurred_at, unsupported_event, verify_hmac_header, MappedWebhook, SignatureVerification,
    WebhookProvider,
};
use axum::http::HeaderMap;
use serde_json::{Map, Value};

pub const SIGNATURE_HEADER: &str = "x-mock-signature";
pub const EVENT_ID_HEADER: &str = "x-mock-event-id";

/// Flat `payment.<status>` envelope used by the mock gateway in local
/// development and tests.
pub struct MockWebhooks {
    secret: Option<String>,
}

impl MockWebhooks {
    pub fn new(secret: Option<String>) -> Self {
        Self { secret }
    }
}

impl WebhookProvider for MockWebhooks {
    fn id(&self) -> &'static str {
        "mock"
    }

    fn verify_signature(&self, raw_body: &[u8], headers: &HeaderMap) -> SignatureVerification {
        verify_hmac_header(self.secret.as_deref(), raw_body, headers, SIGNATURE_HEADER)
    }

    fn map_event(&self, body: &Value, raw_body: &[u8], headers: &HeaderMap) -> Result<MappedWebhook, PaymentError> {
        let event_type = body
            .get("event")
            .and_then(Value::as_str)
            .ok_or_else(|| PaymentError::validation("mock webhook is missing `event`"))?;
        let status = event_type
            .strip_prefix("payment.")
            .and_then(|s| s.parse::<PaymentSessionStatus>().ok())
            .ok_or_else(|| unsupported_event(self.id(), event_type))?;

        let field = |k: &str| body.get(k).and_then(Value::as_str).map(str::to_string);

        let event = CanonicalPaymentEvent {
            provider: self.id().to_string(),
            event_id: event_id_from(headers, EVENT_ID_HEADER, raw_body),
            event_type: event_type.to_string(),
            provider_payment_id: field("payment_id"),
            provider_order_id: field("order_id"),
            status,
            raw_status: field("status").unwrap_or_else(|| status.as_str().to_lowercase()),
            occurred_at: occurred_at(body.get("created_at").and_then(Value::as_i64)),
            payload: sanitize::redact(body),
        };

        Ok(MappedWebhook {
            event,
            payment_session_id: field("session_id"),
        })
    }

    fn to_provider_refs(&self, event: &CanonicalPaymentEvent) -> Map<String, Value> {
        let mut refs = Map::new();
        if let Some(id) = &event.provider_order_id {
            refs.insert("mock_order_id".into(), Value::String(id.clone()));
        }
        if let Some(id) = &event.provider_payment_id {
            refs.insert("mock_payment_id".into(), Value::String(id.clone()));
        }
        refs.insert("mock_status".into(), Value::String(event.raw_status.clone()));
        refs
    }
}
