use crate::domain::status::PaymentSessionStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSession {
    pub id: String,
    pub provider_id: String,
    pub status: PaymentSessionStatus,
    pub amount_minor: i64,
    pub currency: String,
    /// Provider-opaque refs (order id, payment id, last raw status, ...).
    pub data: Map<String, Value>,
    pub correlation_id: Option<String>,
    pub webhook_received_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPaymentSession {
    pub id: String,
    pub provider_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub correlation_id: Option<String>,
}

/// Compare-and-set status write. Applied only while the stored status is
/// still `from`, so two writers racing on one session cannot both win.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub session_id: String,
    pub from: PaymentSessionStatus,
    pub to: PaymentSessionStatus,
    pub provider_refs: Map<String, Value>,
    pub webhook_received_at: Option<DateTime<Utc>>,
}

/// Session to upstream-order mapping, written once per session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderOrder {
    pub session_id: String,
    pub provider_id: String,
    pub provider_order_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub attempt_count: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub session_id: String,
    pub provider_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub correlation_id: String,
}

impl ProviderOrder {
    pub fn matches(&self, request: &OrderRequest) -> bool {
        self.amount_minor == request.amount_minor
            && self.currency.eq_ignore_ascii_case(&request.currency)
    }
}
