mod common;

use common::{harness, razorpay_captured, razorpay_headers, razorpay_payment_event};
use payments_orchestrator::domain::session::NewPaymentSession;
use payments_orchestrator::domain::status::PaymentSessionStatus;
use payments_orchestrator::store::{IdempotencyStore, SessionStore};

async fn seed_session(h: &common::Harness, id: &str) {
    h.store
        .insert_if_absent(NewPaymentSession {
            id: id.to_string(),
            provider_id: "razorpay".to_string(),
            amount_minor: 1499,
            currency: "INR".to_string(),
            correlation_id: None,
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn store_marks_each_event_once() {
    let h = harness();
    let first = h.store.mark_processed("razorpay", "evt_1", "payment.captured").await.unwrap();
    let second = h.store.mark_processed("razorpay", "evt_1", "payment.captured").await.unwrap();
    assert!(first.processed && !first.already_processed);
    assert!(!second.processed && second.already_processed);

    let other_provider = h.store.mark_processed("mock", "evt_1", "payment.captured").await.unwrap();
    assert!(other_provider.processed);
}

#[tokio::test]
async fn concurrent_deliveries_process_exactly_once() {
    let h = harness();
    seed_session(&h, "ps_c").await;
    let raw = razorpay_captured("ps_c", "order_c");
    let headers = razorpay_headers(&raw, "evt_concurrent");

    let results = futures::future::join_all((0..16).map(|_| {
        let pipeline = h.state.webhook_pipeline.clone();
        let raw = raw.clone();
        let headers = headers.clone();
        tokio::spawn(async move { pipeline.process_webhook("razorpay", &raw, &headers, "corr").await })
    }))
    .await;

    let outcomes: Vec<_> = results.into_iter().map(|r| r.unwrap().unwrap()).collect();
    assert_eq!(outcomes.iter().filter(|r| r.processed).count(), 1);
    assert_eq!(outcomes.iter().filter(|r| r.deduped).count(), 15);
    assert_eq!(outcomes.iter().filter(|r| r.changed).count(), 1);

    let session = h.store.get("ps_c").await.unwrap().unwrap();
    assert_eq!(session.status, PaymentSessionStatus::Captured);
}

#[tokio::test]
async fn stale_webhook_is_absorbed_without_regression() {
    let h = harness();
    seed_session(&h, "ps_r").await;

    let captured = razorpay_captured("ps_r", "order_r");
    let out = h
        .state
        .webhook_pipeline
        .process_webhook("razorpay", &captured, &razorpay_headers(&captured, "evt_cap"), "c1")
        .await
        .unwrap();
    assert!(out.changed);

    let authorized = razorpay_payment_event("payment.authorized", "authorized", "ps_r", "order_r");
    let out = h
        .state
        .webhook_pipeline
        .process_webhook("razorpay", &authorized, &razorpay_headers(&authorized, "evt_auth"), "c2")
        .await
        .unwrap();
    assert!(out.processed);
    assert!(out.matched);
    assert!(!out.changed);
    assert_eq!(out.status, Some(PaymentSessionStatus::Captured));

    let session = h.store.get("ps_r").await.unwrap().unwrap();
    assert_eq!(session.status, PaymentSessionStatus::Captured);
}

#[tokio::test]
async fn bad_signature_is_rejected_before_dedupe() {
    let h = harness();
    seed_session(&h, "ps_s").await;
    let raw = razorpay_captured("ps_s", "order_s");
    let mut headers = razorpay_headers(&raw, "evt_sig");
    headers.insert("x-razorpay-signature", "00".parse().unwrap());

    let err = h
        .state
        .webhook_pipeline
        .process_webhook("razorpay", &raw, &headers, "c3")
        .await
        .unwrap_err();
    assert_eq!(err.code, "WEBHOOK_SIGNATURE_MISMATCH");

    // the event id must still be available for the genuine delivery
    let out = h
        .state
        .webhook_pipeline
        .process_webhook("razorpay", &raw, &razorpay_headers(&raw, "evt_sig"), "c4")
        .await
        .unwrap();
    assert!(out.processed && out.changed);
}

#[tokio::test]
async fn session_is_found_through_order_mapping_without_notes() {
    let h = harness();
    let initiated = h
        .state
        .payment_service
        .initiate_payment(payments_orchestrator::service::payment_service::InitiatePayment {
            session_id: "ps_m".to_string(),
            amount_minor: 1499,
            currency: "INR".to_string(),
            correlation_id: "c5".to_string(),
        })
        .await
        .unwrap();

    let mut body: serde_json::Value =
        serde_json::from_slice(&razorpay_captured("ignored", &initiated.provider_order_id)).unwrap();
    body["payload"]["payment"]["entity"]["notes"] = serde_json::json!([]);
    let raw = serde_json::to_vec(&body).unwrap();

    let out = h
        .state
        .webhook_pipeline
        .process_webhook("razorpay", &raw, &razorpay_headers(&raw, "evt_map"), "c6")
        .await
        .unwrap();
    assert_eq!(out.payment_session_id.as_deref(), Some("ps_m"));
    assert!(out.changed);
}
