use crate::config::AppConfig;
use crate::domain::event::CanonicalPaymentEvent;
use crate::domain::provider_id::resolve_provider_id;
use crate::error::PaymentError;
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;

pub mod mock;
pub mod razorpay;

pub const SECRET_MISSING: &str = "WEBHOOK_SECRET_MISSING";
pub const SIGNATURE_MISSING: &str = "WEBHOOK_SIGNATURE_MISSING";
pub const SIGNATURE_MISMATCH: &str = "WEBHOOK_SIGNATURE_MISMATCH";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureVerification {
    pub verified: bool,
    pub error_code: Option<&'static str>,
    pub message: Option<String>,
}

impl SignatureVerification {
    pub fn ok() -> Self {
        Self {
            verified: true,
            error_code: None,
            message: None,
        }
    }

    pub fn failed(error_code: &'static str, message: impl Into<String>) -> Self {
        Self {
            verified: false,
            error_code: Some(error_code),
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MappedWebhook {
    pub event: CanonicalPaymentEvent,
    /// `None` when the payload carries no session reference; the pipeline
    /// then resolves the session through the provider-order mapping.
    pub payment_session_id: Option<String>,
}

/// Per-provider webhook strategy. Pure given its inputs.
pub trait WebhookProvider: Send + Sync {
    fn id(&self) -> &'static str;

    fn verify_signature(&self, raw_body: &[u8], headers: &HeaderMap) -> SignatureVerification;

    fn map_event(&self, body: &Value, raw_body: &[u8], headers: &HeaderMap) -> Result<MappedWebhook, PaymentError>;

    /// Provider-native field names to merge into the session's data blob.
    fn to_provider_refs(&self, event: &CanonicalPaymentEvent) -> Map<String, Value>;
}

#[derive(Clone)]
pub struct WebhookRegistry {
    providers: Vec<Arc<dyn WebhookProvider>>,
}

impl WebhookRegistry {
    pub fn new(providers: Vec<Arc<dyn WebhookProvider>>) -> Self {
        Self { providers }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(vec![
            Arc::new(razorpay::RazorpayWebhooks::new(cfg.razorpay_webhook_secret.clone())),
            Arc::new(mock::MockWebhooks::new(cfg.mock_webhook_secret.clone())),
        ])
    }

    pub fn resolve(&self, provider_id: &str) -> Option<Arc<dyn WebhookProvider>> {
        let known: Vec<&str> = self.providers.iter().map(|p| p.id()).collect();
        let id = resolve_provider_id(provider_id, &known)?;
        self.providers.iter().find(|p| p.id() == id).cloned()
    }
}

pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

pub fn hmac_sha256_hex(secret: &str, payload: &[u8]) -> String {
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Shared HMAC-SHA256 hex check over the exact raw body.
pub fn verify_hmac_header(
    secret: Option<&str>,
    raw_body: &[u8],
    headers: &HeaderMap,
    signature_header: &str,
) -> SignatureVerification {
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        return SignatureVerification::failed(SECRET_MISSING, "webhook secret is not configured");
    };
    let Some(provided) = header_str(headers, signature_header) else {
        return SignatureVerification::failed(
            SIGNATURE_MISSING,
            format!("missing {signature_header} header"),
        );
    };

    let expected = hmac_sha256_hex(secret, raw_body);
    let provided = provided.to_ascii_lowercase();
    if expected.as_bytes().ct_eq(provided.as_bytes()).into() {
        SignatureVerification::ok()
    } else {
        SignatureVerification::failed(SIGNATURE_MISMATCH, "webhook signature does not match payload")
    }
}

/// Event id from the provider header, else a content hash of the raw body.
/// Two distinct deliveries with byte-identical bodies and no header share a key.
pub fn event_id_from(headers: &HeaderMap, header: &str, raw_body: &[u8]) -> String {
    match header_str(headers, header) {
        Some(id) => id.to_string(),
        None => format!("sha256:{}", hex::encode(Sha256::digest(raw_body))),
    }
}

pub fn occurred_at(epoch_seconds: Option<i64>) -> chrono::DateTime<chrono::Utc> {
    epoch_seconds
        .and_then(|s| chrono::DateTime::from_timestamp(s, 0))
        .unwrap_or_else(chrono::Utc::now)
}

pub fn unsupported_event(provider: &str, event_type: &str) -> PaymentError {
    PaymentError::validation(format!("unsupported {provider} webhook event `{event_type}`"))
        .with_code("WEBHOOK_EVENT_UNSUPPORTED")
        .with_details(serde_json::json!({"provider": provider, "event_type": event_type}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn distinguishes_three_failure_reasons() {
        let body = br#"{"a":1}"#;
        let mut headers = HeaderMap::new();

        let out = verify_hmac_header(None, body, &headers, "x-sig");
        assert_eq!(out.error_code, Some(SECRET_MISSING));

        let out = verify_hmac_header(Some("s"), body, &headers, "x-sig");
        assert_eq!(out.error_code, Some(SIGNATURE_MISSING));

        headers.insert("x-sig", HeaderValue::from_static("deadbeef"));
        let out = verify_hmac_header(Some("s"), body, &headers, "x-sig");
        assert_eq!(out.error_code, Some(SIGNATURE_MISMATCH));

        let sig = hmac_sha256_hex("s", body);
        headers.insert("x-sig", HeaderValue::from_str(&sig).unwrap());
        assert!(verify_hmac_header(Some("s"), body, &headers, "x-sig").verified);
    }

    #[test]
    fn signature_covers_exact_bytes() {
        let sig = hmac_sha256_hex("s", br#"{"a":1}"#);
        let mut headers = HeaderMap::new();
        headers.insert("x-sig", HeaderValue::from_str(&sig).unwrap());
        assert!(!verify_hmac_header(Some("s"), br#"{"a": 1}"#, &headers, "x-sig").verified);
    }

    #[test]
    fn event_id_prefers_header_then_hash() {
        let mut headers = HeaderMap::new();
        let a = event_id_from(&headers, "x-event-id", b"body");
        let b = event_id_from(&headers, "x-event-id", b"body");
        assert_eq!(a, b);
        assert!(a.starts_with("sha256:"));

        headers.insert("x-event-id", HeaderValue::from_static("evt_9"));
        assert_eq!(event_id_from(&headers, "x-event-id", b"body"), "evt_9");
    }

    #[test]
    fn registry_resolves_namespaced_ids() {
        let reg = WebhookRegistry::from_config(&AppConfig::default());
        assert_eq!(reg.resolve("pp_razorpay_razorpay").map(|p| p.id()), Some("razorpay"));
        assert!(reg.resolve("stripe").is_none());
    }
}
