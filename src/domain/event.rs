use crate::domain::status::PaymentSessionStatus;
use serde::{Deserialize, Serialize};

/// A webhook delivery or status poll normalized to one provider-agnostic shape.
/// Never persisted itself; only its effect on the session is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalPaymentEvent {
    pub provider: String,
    pub event_id: String,
    pub event_type: String,
    pub provider_payment_id: Option<String>,
    pub provider_order_id: Option<String>,
    pub status: PaymentSessionStatus,
    pub raw_status: String,
    pub occurred_at: chrono::DateTime<chrono::Utc>,
    /// Already passed through `sanitize::redact`.
    pub payload: serde_json::Value,
}
