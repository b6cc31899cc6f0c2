use crate::domain::session::{OrderRequest, PaymentSession, ProviderOrder};
use crate::domain::status::PaymentSessionStatus;
use crate::error::PaymentError;
use crate::gateways::{PaymentGateway, ProviderStatus};
use crate::sanitize;
use crate::upstream::{CallContext, CallKind, UpstreamCaller, UpstreamFailure};
use serde_json::{json, Map, Value};
use std::time::Duration;

pub struct RazorpayGateway {
    pub base_url: String,
    pub key_id: String,
    pub key_secret: String,
    pub timeout_ms: u64,
    pub client: reqwest::Client,
    pub caller: UpstreamCaller,
}

impl RazorpayGateway {
    pub fn new(base_url: &str, key_id: &str, key_secret: &str, timeout_ms: u64, caller: UpstreamCaller) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            key_id: key_id.to_string(),
            key_secret: key_secret.to_string(),
            timeout_ms,
            client: reqwest::Client::new(),
            caller,
        }
    }

    fn ensure_credentials(&self, correlation_id: &str) -> Result<(), PaymentError> {
        if self.key_id.is_empty() || self.key_secret.is_empty() {
            return Err(PaymentError::provider_unavailable("razorpay API credentials are not configured")
                .with_correlation_id(correlation_id));
        }
        Ok(())
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, UpstreamFailure> {
        let resp = request
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .timeout(Duration::from_millis(self.timeout_ms))
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(UpstreamFailure::http(status.as_u16(), &text));
        }
        serde_json::from_str(&text).map_err(|e| UpstreamFailure {
            status: Some(status.as_u16()),
            body: sanitize::redact_body(&text),
            message: format!("unparseable provider response: {e}"),
        })
    }

    async fn post(&self, ctx: &CallContext<'_>, path: &str, body: &Value) -> Result<Value, PaymentError> {
        let url = format!("{}{}", self.base_url, path);
        self.caller
            .call(ctx, |_| self.send(self.client.post(&url).json(body)))
            .await
    }

    async fn get(&self, ctx: &CallContext<'_>, path: &str) -> Result<Value, PaymentError> {
        let url = format!("{}{}", self.base_url, path);
        self.caller.call(ctx, |_| self.send(self.client.get(&url))).await
    }

    /// Captured payment id, from the webhook refs if present, else from a poll.
    async fn payment_id_for(
        &self,
        correlation_id: &str,
        session: &PaymentSession,
        order: &ProviderOrder,
    ) -> Result<String, PaymentError> {
        if let Some(id) = session.data.get("razorpay_payment_id").and_then(Value::as_str) {
            return Ok(id.to_string());
        }
        let polled = self.fetch_status(correlation_id, order).await?;
        polled.provider_payment_id.ok_or_else(|| {
            PaymentError::validation("no razorpay payment exists for this order yet")
                .with_code("PAYMENT_NOT_FOUND")
                .with_correlation_id(correlation_id)
        })
    }
}

pub fn map_payment_status(raw: &str) -> PaymentSessionStatus {
    match raw {
        "authorized" => PaymentSessionStatus::Authorized,
        "captured" => PaymentSessionStatus::Captured,
        "refunded" => PaymentSessionStatus::Refunded,
        "failed" => PaymentSessionStatus::Failed,
        _ => PaymentSessionStatus::Pending,
    }
}

fn progress_rank(status: PaymentSessionStatus) -> u8 {
    match status {
        PaymentSessionStatus::Failed => 0,
        PaymentSessionStatus::Pending | PaymentSessionStatus::Cancelled => 1,
        PaymentSessionStatus::Authorized => 2,
        PaymentSessionStatus::Captured => 3,
        PaymentSessionStatus::Refunded => 4,
    }
}

/// An order can carry several payment attempts; the most advanced one wins.
/// Failed only wins when every attempt failed.
pub fn summarize_order_payments(order_id: &str, collection: &Value) -> ProviderStatus {
    let best = collection
        .get("items")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|item| {
            let raw = item.get("status")?.as_str()?;
            Some((map_payment_status(raw), raw, item.get("id").and_then(Value::as_str)))
        })
        .max_by_key(|(status, _, _)| progress_rank(*status));

    let (status, raw_status, payment_id) = match best {
        Some((status, raw, id)) => (status, raw.to_string(), id.map(str::to_string)),
        None => (PaymentSessionStatus::Pending, "created".to_string(), None),
    };

    let mut refs = Map::new();
    refs.insert("razorpay_order_id".into(), Value::String(order_id.to_string()));
    refs.insert("razorpay_status".into(), Value::String(raw_status.clone()));
    if let Some(id) = &payment_id {
        refs.insert("razorpay_payment_id".into(), Value::String(id.clone()));
    }

    ProviderStatus {
        status,
        raw_status,
        provider_payment_id: payment_id,
        provider_order_id: Some(order_id.to_string()),
        refs,
    }
}

#[async_trait::async_trait]
impl PaymentGateway for RazorpayGateway {
    fn id(&self) -> &str {
        "razorpay"
    }

    fn supported_currencies(&self) -> &[&'static str] {
        &["INR"]
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<String, PaymentError> {
        self.ensure_credentials(&request.correlation_id)?;
        let body = json!({
            "amount": request.amount_minor,
            "currency": request.currency.to_uppercase(),
            "receipt": request.session_id,
            "notes": {"session_id": request.session_id},
        });
        let ctx = CallContext::new(&request.correlation_id, "razorpay", "/v1/orders", CallKind::OrderCreate);
        let created = self.post(&ctx, "/v1/orders", &body).await?;

        created
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                PaymentError::new(crate::error::ErrorKind::Upstream, "razorpay order response has no id")
                    .with_correlation_id(&request.correlation_id)
            })
    }

    async fn fetch_status(&self, correlation_id: &str, order: &ProviderOrder) -> Result<ProviderStatus, PaymentError> {
        self.ensure_credentials(correlation_id)?;
        let path = format!("/v1/orders/{}/payments", order.provider_order_id);
        let ctx = CallContext::new(correlation_id, "razorpay", "/v1/orders/:id/payments", CallKind::StatusPoll);
        let collection = self.get(&ctx, &path).await?;
        Ok(summarize_order_payments(&order.provider_order_id, &collection))
    }

    async fn capture(
        &self,
        correlation_id: &str,
        session: &PaymentSession,
        order: &ProviderOrder,
    ) -> Result<ProviderStatus, PaymentError> {
        self.ensure_credentials(correlation_id)?;
        let payment_id = self.payment_id_for(correlation_id, session, order).await?;
        let path = format!("/v1/payments/{payment_id}/capture");
        let ctx = CallContext::new(correlation_id, "razorpay", "/v1/payments/:id/capture", CallKind::Capture);
        let body = json!({"amount": order.amount_minor, "currency": order.currency.to_uppercase()});
        let payment = self.post(&ctx, &path, &body).await?;

        let raw_status = payment
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("captured")
            .to_string();
        let mut refs = Map::new();
        refs.insert("razorpay_payment_id".into(), Value::String(payment_id.clone()));
        refs.insert("razorpay_status".into(), Value::String(raw_status.clone()));
        Ok(ProviderStatus {
            status: map_payment_status(&raw_status),
            raw_status,
            provider_payment_id: Some(payment_id),
            provider_order_id: Some(order.provider_order_id.clone()),
            refs,
        })
    }

    async fn refund(
        &self,
        correlation_id: &str,
        session: &PaymentSession,
        order: &ProviderOrder,
        amount_minor: i64,
    ) -> Result<ProviderStatus, PaymentError> {
        self.ensure_credentials(correlation_id)?;
        let payment_id = self.payment_id_for(correlation_id, session, order).await?;
        let path = format!("/v1/payments/{payment_id}/refund");
        let ctx = CallContext::new(correlation_id, "razorpay", "/v1/payments/:id/refund", CallKind::Refund);
        let refund = self.post(&ctx, &path, &json!({"amount": amount_minor})).await?;

        let raw_status = refund
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("processed")
            .to_string();
        let mut refs = Map::new();
        refs.insert("razorpay_payment_id".into(), Value::String(payment_id.clone()));
        refs.insert("razorpay_status".into(), Value::String(raw_status.clone()));
        if let Some(id) = refund.get("id").and_then(Value::as_str) {
            refs.insert("razorpay_refund_id".into(), Value::String(id.to_string()));
        }
        Ok(ProviderStatus {
            status: PaymentSessionStatus::Refunded,
            raw_status,
            provider_payment_id: Some(payment_id),
            provider_order_id: Some(order.provider_order_id.clone()),
            refs,
        })
    }
}
