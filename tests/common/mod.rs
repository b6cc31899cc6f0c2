#![allow(dead_code)]

use axum::http::{HeaderMap, HeaderValue};
use payments_orchestrator::config::AppConfig;
use payments_orchestrator::gateways::mock::MockGateway;
use payments_orchestrator::gateways::PaymentGateway;
use payments_orchestrator::repo::memory::InMemoryStore;
use payments_orchestrator::upstream::{RetryPolicy, UpstreamCaller};
use payments_orchestrator::webhooks::hmac_sha256_hex;
use payments_orchestrator::AppState;
use std::sync::Arc;
use std::time::Duration;

pub const RAZORPAY_SECRET: &str = "whsec_razorpay_test";
pub const MOCK_SECRET: &str = "whsec_mock_test";

pub struct Harness {
    pub store: InMemoryStore,
    /// Stands in for the Razorpay REST API; webhooks still go through the
    /// real Razorpay mapping.
    pub razorpay: MockGateway,
    pub mock: MockGateway,
    pub state: AppState,
}

pub fn test_config() -> AppConfig {
    AppConfig {
        razorpay_webhook_secret: Some(RAZORPAY_SECRET.to_string()),
        mock_webhook_secret: Some(MOCK_SECRET.to_string()),
        ..AppConfig::default()
    }
}

pub fn fast_caller() -> UpstreamCaller {
    UpstreamCaller::new(RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
    })
}

pub fn harness() -> Harness {
    harness_with(test_config())
}

pub fn harness_with(config: AppConfig) -> Harness {
    let store = InMemoryStore::new();
    let razorpay = MockGateway::new("razorpay", fast_caller());
    let mock = MockGateway::new("mock", fast_caller());
    let gateways: Vec<Arc<dyn PaymentGateway>> = vec![Arc::new(razorpay.clone()), Arc::new(mock.clone())];
    let state = AppState::new(
        Arc::new(config),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        gateways,
        None,
    );
    Harness {
        store,
        razorpay,
        mock,
        state,
    }
}

pub fn razorpay_captured(session_id: &str, order_id: &str) -> Vec<u8> {
    razorpay_payment_event("payment.captured", "captured", session_id, order_id)
}

pub fn razorpay_payment_event(event: &str, status: &str, session_id: &str, order_id: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "entity": "event",
        "event": event,
        "created_at": 1_700_000_000,
        "payload": {
            "payment": {
                "entity": {
                    "id": format!("pay_{order_id}"),
                    "order_id": order_id,
                    "status": status,
                    "amount": 1499,
                    "currency": "INR",
                    "email": "buyer@example.com",
                    "notes": {"session_id": session_id}
                }
            }
        }
    }))
    .unwrap()
}

pub fn razorpay_headers(raw: &[u8], event_id: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        "x-razorpay-signature",
        HeaderValue::from_str(&hmac_sha256_hex(RAZORPAY_SECRET, raw)).unwrap(),
    );
    headers.insert("x-razorpay-event-id", HeaderValue::from_str(event_id).unwrap());
    headers
}
