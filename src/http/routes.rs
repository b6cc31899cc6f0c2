use crate::http::handlers::{ops, payments, webhooks};
use crate::AppState;
use axum::routing::{get, post};
use axum::Router;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhooks/:provider", post(webhooks::receive_webhook))
        .route("/payments/:session_id", get(payments::get_payment_status))
        .route("/payments/:session_id/initiate", post(payments::initiate_payment))
        .route("/payments/:session_id/authorize", post(payments::authorize_payment))
        .route("/payments/:session_id/capture", post(payments::capture_payment))
        .route("/payments/:session_id/refund", post(payments::refund_payment))
        .route("/payments/:session_id/cancel", post(payments::cancel_payment))
        .route("/ops/readiness", get(ops::readiness))
        .route("/ops/liveness", get(ops::liveness))
        .with_state(state)
}
