use crate::domain::context::build_context;
use crate::domain::payment::{InitiatePaymentRequest, RefundPaymentRequest};
use crate::service::payment_service::InitiatePayment;
use crate::AppState;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

fn respond<T: Serialize>(result: Result<T, crate::error::PaymentError>) -> Response {
    match result {
        Ok(body) => (axum::http::StatusCode::OK, Json(body)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn initiate_payment(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<InitiatePaymentRequest>,
) -> impl IntoResponse {
    let ctx = build_context(&headers);
    respond(
        state
            .payment_service
            .initiate_payment(InitiatePayment {
                session_id,
                amount_minor: req.amount_minor,
                currency: req.currency,
                correlation_id: ctx.correlation_id,
            })
            .await,
    )
}

pub async fn authorize_payment(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let ctx = build_context(&headers);
    respond(state.payment_service.authorize_payment(&session_id, &ctx.correlation_id).await)
}

pub async fn capture_payment(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let ctx = build_context(&headers);
    respond(state.payment_service.capture_payment(&session_id, &ctx.correlation_id).await)
}

pub async fn refund_payment(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    body: Option<Json<RefundPaymentRequest>>,
) -> impl IntoResponse {
    let ctx = build_context(&headers);
    let req = body.map(|Json(r)| r).unwrap_or_default();
    respond(
        state
            .payment_service
            .refund_payment(&session_id, req.amount_minor, &ctx.correlation_id)
            .await,
    )
}

pub async fn cancel_payment(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let ctx = build_context(&headers);
    respond(state.payment_service.cancel_payment(&session_id, &ctx.correlation_id).await)
}

pub async fn get_payment_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let ctx = build_context(&headers);
    respond(state.payment_service.get_payment_status(&session_id, &ctx.correlation_id).await)
}
