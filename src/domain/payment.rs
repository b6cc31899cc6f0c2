use crate::domain::status::PaymentSessionStatus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InitiatePaymentRequest {
    pub amount_minor: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RefundPaymentRequest {
    pub amount_minor: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiatePaymentResponse {
    pub payment_session_id: String,
    pub provider: String,
    pub provider_order_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub status: PaymentSessionStatus,
    pub correlation_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentStatusResponse {
    pub payment_session_id: String,
    pub provider: String,
    pub status: PaymentSessionStatus,
    pub changed: bool,
    pub correlation_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorPayload,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub correlation_id: Option<String>,
}
