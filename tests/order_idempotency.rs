mod common;

use common::harness;
use payments_orchestrator::domain::status::PaymentSessionStatus;
use payments_orchestrator::error::ErrorKind;
use payments_orchestrator::service::payment_service::InitiatePayment;
use payments_orchestrator::store::{IdempotencyStore, SessionStore};

fn initiate(session_id: &str, amount_minor: i64, currency: &str) -> InitiatePayment {
    InitiatePayment {
        session_id: session_id.to_string(),
        amount_minor,
        currency: currency.to_string(),
        correlation_id: format!("corr-{session_id}"),
    }
}

#[tokio::test]
async fn concurrent_initiates_create_one_upstream_order() {
    let h = harness();

    let results = futures::future::join_all((0..12).map(|_| {
        let service = h.state.payment_service.clone();
        tokio::spawn(async move { service.initiate_payment(initiate("ps_race", 1499, "INR")).await })
    }))
    .await;

    let order_ids: Vec<String> = results
        .into_iter()
        .map(|r| r.unwrap().unwrap().provider_order_id)
        .collect();
    assert!(order_ids.iter().all(|id| id == &order_ids[0]));
    assert_eq!(h.razorpay.orders_created(), 1);

    let order = h.store.find_order_by_session("ps_race").await.unwrap().unwrap();
    assert_eq!(order.provider_order_id, order_ids[0]);
    assert_eq!(order.attempt_count, 12);
}

#[tokio::test]
async fn changing_amount_after_order_is_rejected_and_mapping_kept() {
    let h = harness();
    let first = h
        .state
        .payment_service
        .initiate_payment(initiate("ps_fixed", 1499, "INR"))
        .await
        .unwrap();

    let err = h
        .state
        .payment_service
        .initiate_payment(initiate("ps_fixed", 2000, "INR"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::ImmutableOrderFields);
    assert_eq!(err.correlation_id.as_deref(), Some("corr-ps_fixed"));

    let order = h.store.find_order_by_session("ps_fixed").await.unwrap().unwrap();
    assert_eq!(order.provider_order_id, first.provider_order_id);
    assert_eq!(order.amount_minor, 1499);
    assert_eq!(h.store.get("ps_fixed").await.unwrap().unwrap().amount_minor, 1499);
    assert_eq!(h.razorpay.orders_created(), 1);
}

#[tokio::test]
async fn currency_case_does_not_count_as_a_change() {
    let h = harness();
    let a = h
        .state
        .payment_service
        .initiate_payment(initiate("ps_case", 500, "INR"))
        .await
        .unwrap();
    let b = h
        .state
        .payment_service
        .initiate_payment(initiate("ps_case", 500, "inr"))
        .await
        .unwrap();
    assert_eq!(a.provider_order_id, b.provider_order_id);
}

#[tokio::test]
async fn failed_order_create_leaves_no_mapping() {
    let h = harness();
    h.razorpay
        .fail_next(payments_orchestrator::upstream::CallKind::OrderCreate, &[400]);

    let err = h
        .state
        .payment_service
        .initiate_payment(initiate("ps_retry", 700, "INR"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Upstream);
    assert!(h.store.find_order_by_session("ps_retry").await.unwrap().is_none());

    let ok = h
        .state
        .payment_service
        .initiate_payment(initiate("ps_retry", 700, "INR"))
        .await
        .unwrap();
    assert_eq!(ok.provider_order_id, "order_1");
}

#[tokio::test]
async fn amount_can_change_before_any_order_exists() {
    let h = harness();
    h.razorpay
        .fail_next(payments_orchestrator::upstream::CallKind::OrderCreate, &[400]);
    let _ = h
        .state
        .payment_service
        .initiate_payment(initiate("ps_edit", 700, "INR"))
        .await;

    let ok = h
        .state
        .payment_service
        .initiate_payment(initiate("ps_edit", 900, "INR"))
        .await
        .unwrap();
    assert_eq!(ok.amount_minor, 900);
    assert_eq!(h.store.get("ps_edit").await.unwrap().unwrap().amount_minor, 900);
}

#[tokio::test]
async fn invalid_input_is_a_validation_error() {
    let h = harness();
    let err = h
        .state
        .payment_service
        .initiate_payment(initiate("ps_bad", 0, "INR"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
    assert!(h.store.get("ps_bad").await.unwrap().is_none());
}

#[tokio::test]
async fn cancelled_session_gets_no_new_order() {
    let h = harness();
    h.razorpay
        .fail_next(payments_orchestrator::upstream::CallKind::OrderCreate, &[400]);
    let _ = h
        .state
        .payment_service
        .initiate_payment(initiate("ps_gone", 700, "INR"))
        .await;

    let cancelled = h
        .state
        .payment_service
        .cancel_payment("ps_gone", "corr-cancel")
        .await
        .unwrap();
    assert_eq!(cancelled.status, PaymentSessionStatus::Cancelled);

    let err = h
        .state
        .payment_service
        .initiate_payment(initiate("ps_gone", 700, "INR"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidTransition);
    assert_eq!(err.code, "STATE_TRANSITION_INVALID");
    assert_eq!(err.details["status"], "CANCELLED");
    assert_eq!(err.correlation_id.as_deref(), Some("corr-ps_gone"));
    assert_eq!(h.razorpay.orders_created(), 0);
    assert!(h.store.find_order_by_session("ps_gone").await.unwrap().is_none());
    assert_eq!(
        h.store.get("ps_gone").await.unwrap().unwrap().status,
        PaymentSessionStatus::Cancelled
    );
}

#[tokio::test]
async fn replaying_initiate_after_capture_returns_the_existing_order() {
    let h = harness();
    let first = h
        .state
        .payment_service
        .initiate_payment(initiate("ps_paid", 1499, "INR"))
        .await
        .unwrap();
    h.state
        .payment_service
        .capture_payment("ps_paid", "corr-capture")
        .await
        .unwrap();

    let replay = h
        .state
        .payment_service
        .initiate_payment(initiate("ps_paid", 1499, "INR"))
        .await
        .unwrap();
    assert_eq!(replay.provider_order_id, first.provider_order_id);
    assert_eq!(replay.status, PaymentSessionStatus::Captured);
    assert_eq!(h.razorpay.orders_created(), 1);
}
