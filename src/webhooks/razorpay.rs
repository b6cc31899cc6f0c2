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

pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";
pub const EVENT_ID_HEADER: &str = "x-razorpay-event-id";

pub struct RazorpayWebhooks {
    secret: Option<String>,
}

impl RazorpayWebhooks {
    pub fn new(secret: Option<String>) -> Self {
        Self { secret }
    }
}

pub fn map_event_type(event_type: &str) -> Option<PaymentSessionStatus> {
    match event_type {
        "payment.authorized" => Some(PaymentSessionStatus::Authorized),
        "payment.captured" | "order.paid" => Some(PaymentSessionStatus::Captured),
        "payment.failed" => Some(PaymentSessionStatus::Failed),
        // `refund.created` is left unmapped: the refund can still fail after it.
        "refund.processed" => Some(PaymentSessionStatus::Refunded),
        _ => None,
    }
}

fn entity<'a>(body: &'a Value, name: &str) -> Option<&'a Value> {
    body.get("payload")?.get(name)?.get("entity")
}

fn str_field(v: Option<&Value>, key: &str) -> Option<String> {
    v?.get(key)?.as_str().map(str::to_string)
}

fn session_note(v: Option<&Value>) -> Option<String> {
    let notes = v?.get("notes")?;
    ["session_id", "payment_session_id"]
        .iter()
        .find_map(|k| notes.get(*k).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl WebhookProvider for RazorpayWebhooks {
    fn id(&self) -> &'static str {
        "razorpay"
    }

    fn verify_signature(&self, raw_body: &[u8], headers: &HeaderMap) -> SignatureVerification {
        verify_hmac_header(self.secret.as_deref(), raw_body, headers, SIGNATURE_HEADER)
    }

    fn map_event(&self, body: &Value, raw_body: &[u8], headers: &HeaderMap) -> Result<MappedWebhook, PaymentError> {
        let event_type = body
            .get("event")
            .and_then(Value::as_str)
            .ok_or_else(|| PaymentError::validation("razorpay webhook is missing `event`"))?;
        let status = map_event_type(event_type).ok_or_else(|| unsupported_event(self.id(), event_type))?;

        let payment = entity(body, "payment");
        let order = entity(body, "order");
        let refund = entity(body, "refund");

        let provider_payment_id =
            str_field(payment, "id").or_else(|| str_field(refund, "payment_id"));
        let provider_order_id = str_field(payment, "order_id").or_else(|| str_field(order, "id"));
        let raw_status = str_field(refund, "status")
            .filter(|_| event_type.starts_with("refund."))
            .or_else(|| str_field(payment, "status"))
            .or_else(|| str_field(order, "status"))
            .unwrap_or_else(|| event_type.to_string());

        let payment_session_id = session_note(payment)
            .or_else(|| session_note(order))
            .or_else(|| session_note(refund));

        let event = CanonicalPaymentEvent {
            provider: self.id().to_string(),
            event_id: event_id_from(headers, EVENT_ID_HEADER, raw_body),
            event_type: event_type.to_string(),
            provider_payment_id,
            provider_order_id,
            status,
            raw_status,
            occurred_at: occurred_at(body.get("created_at").and_then(Value::as_i64)),
            payload: sanitize::redact(body),
        };

        Ok(MappedWebhook {
            event,
            payment_session_id,
        })
    }

    fn to_provider_refs(&self, event: &CanonicalPaymentEvent) -> Map<String, Value> {
        let mut refs = Map::new();
        if let Some(id) = &event.provider_order_id {
            refs.insert("razorpay_order_id".into(), Value::String(id.clone()));
        }
        if let Some(id) = &event.provider_payment_id {
            refs.insert("razorpay_payment_id".into(), Value::String(id.clone()));
        }
        refs.insert("razorpay_status".into(), Value::String(event.raw_status.clone()));
        refs.insert("razorpay_last_event".into(), Value::String(event.event_type.clone()));
        refs
    }
}
