//! Persistence contract consumed by the engine.
//!
//! All cross-call coordination (webhook dedupe, single upstream order per
//! session, compare-and-set status writes) lives behind these traits so the
//! guarantees come from the store, not from in-process state.

use crate::domain::session::{NewPaymentSession, OrderRequest, PaymentSession, ProviderOrder, StatusUpdate};
use crate::domain::status::PaymentSessionStatus;
use crate::error::PaymentError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DedupeOutcome {
    pub processed: bool,
    pub already_processed: bool,
}

impl DedupeOutcome {
    pub fn first() -> Self {
        Self {
            processed: true,
            already_processed: false,
        }
    }

    pub fn duplicate() -> Self {
        Self {
            processed: false,
            already_processed: true,
        }
    }
}

/// Performs the actual upstream order creation while the store holds the
/// session's order lock.
#[async_trait]
pub trait OrderCreator: Send + Sync {
    async fn create_upstream_order(&self, request: &OrderRequest) -> Result<String, PaymentError>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Result<Option<PaymentSession>, PaymentError>;

    /// Inserts the session unless one with the same id exists; returns the stored row.
    async fn insert_if_absent(&self, session: NewPaymentSession) -> Result<PaymentSession, PaymentError>;

    /// Compare-and-set on the current status. Returns `false` when another
    /// writer moved the session first.
    async fn update_status(&self, update: &StatusUpdate) -> Result<bool, PaymentError>;

    async fn merge_data(&self, session_id: &str, refs: &Map<String, Value>) -> Result<(), PaymentError>;

    /// Sessions in one of `statuses` last updated before `older_than`, oldest first.
    async fn list_stale(
        &self,
        statuses: &[PaymentSessionStatus],
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<PaymentSession>, PaymentError>;
}

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Conditional insert on `(provider, event_id)`. Only the first caller
    /// for a key gets `processed=true`.
    async fn mark_processed(
        &self,
        provider: &str,
        event_id: &str,
        event_type: &str,
    ) -> Result<DedupeOutcome, PaymentError>;

    /// Returns the session's upstream order, creating it through `creator`
    /// at most once. Concurrent callers for one session serialize on a
    /// session-scoped lock; a mapping that disagrees on amount or currency
    /// fails with `ImmutableOrderFields` and is left untouched.
    ///
    /// A new order is only created for a `PENDING` session, and the session's
    /// amount and currency are pinned to the request inside the same lock.
    async fn create_or_get_order(
        &self,
        request: &OrderRequest,
        creator: &dyn OrderCreator,
    ) -> Result<ProviderOrder, PaymentError>;

    async fn find_order_by_session(&self, session_id: &str) -> Result<Option<ProviderOrder>, PaymentError>;

    async fn find_order_by_provider_order_id(
        &self,
        provider_order_id: &str,
    ) -> Result<Option<ProviderOrder>, PaymentError>;
}

pub fn immutability_violation(existing: &ProviderOrder, request: &OrderRequest) -> PaymentError {
    PaymentError::new(
        crate::error::ErrorKind::ImmutableOrderFields,
        format!(
            "payment session {} already has upstream order {}; amount and currency cannot change",
            existing.session_id, existing.provider_order_id
        ),
    )
    .with_details(serde_json::json!({
        "payment_session_id": existing.session_id,
        "stored_amount_minor": existing.amount_minor,
        "stored_currency": existing.currency,
        "requested_amount_minor": request.amount_minor,
        "requested_currency": request.currency,
    }))
    .with_correlation_id(&request.correlation_id)
}

pub fn order_requires_pending(
    session_id: &str,
    status: PaymentSessionStatus,
    request: &OrderRequest,
) -> PaymentError {
    PaymentError::new(
        crate::error::ErrorKind::InvalidTransition,
        format!(
            "payment session {session_id} is {}; an upstream order can only be created while PENDING",
            status.as_str()
        ),
    )
    .with_details(serde_json::json!({
        "payment_session_id": session_id,
        "status": status.as_str(),
    }))
    .with_correlation_id(&request.correlation_id)
}

pub fn order_session_missing(request: &OrderRequest) -> PaymentError {
    PaymentError::not_found(format!("payment session {} not found", request.session_id))
        .with_code("PAYMENT_SESSION_NOT_FOUND")
        .with_correlation_id(&request.correlation_id)
}
