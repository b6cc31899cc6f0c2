use crate::domain::session::{OrderRequest, PaymentSession, ProviderOrder};
use crate::domain::status::PaymentSessionStatus;
use crate::error::PaymentError;
use crate::gateways::{PaymentGateway, ProviderStatus};
use crate::upstream::{CallContext, CallKind, UpstreamCaller, UpstreamFailure};
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct MockState {
    orders_created: u32,
    statuses: HashMap<String, PaymentSessionStatus>,
    scripted_failures: HashMap<CallKind, VecDeque<u16>>,
    attempts: HashMap<CallKind, u32>,
}

/// In-process provider used for local development and tests. Failures can be
/// scripted per call kind; every attempt is counted.
#[derive(Clone)]
pub struct MockGateway {
    pub gateway_name: String,
    pub refunds_enabled: bool,
    caller: UpstreamCaller,
    state: Arc<Mutex<MockState>>,
}

impl MockGateway {
    pub fn new(gateway_name: impl Into<String>, caller: UpstreamCaller) -> Self {
        Self {
            gateway_name: gateway_name.into(),
            refunds_enabled: true,
            caller,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    pub fn without_refunds(mut self) -> Self {
        self.refunds_enabled = false;
        self
    }

    /// What the provider will report for `order_id` on the next poll.
    pub fn set_status(&self, order_id: &str, status: PaymentSessionStatus) {
        self.with_state(|s| {
            s.statuses.insert(order_id.to_string(), status);
        });
    }

    /// The next `statuses.len()` attempts of `kind` fail with these HTTP statuses.
    pub fn fail_next(&self, kind: CallKind, statuses: &[u16]) {
        self.with_state(|s| s.scripted_failures.entry(kind).or_default().extend(statuses));
    }

    pub fn attempts(&self, kind: CallKind) -> u32 {
        self.with_state(|s| s.attempts.get(&kind).copied().unwrap_or(0))
    }

    pub fn orders_created(&self) -> u32 {
        self.with_state(|s| s.orders_created)
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> T {
        let mut guard = match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// Records one attempt and pops a scripted failure if any is queued.
    fn begin_attempt(&self, kind: CallKind) -> Result<(), UpstreamFailure> {
        self.with_state(|s| {
            *s.attempts.entry(kind).or_default() += 1;
            match s.scripted_failures.get_mut(&kind).and_then(VecDeque::pop_front) {
                Some(status) => Err(UpstreamFailure::http(status, r#"{"error":{"code":"MOCK_FAILURE"}}"#)),
                None => Ok(()),
            }
        })
    }

    fn status_of(&self, order_id: &str) -> PaymentSessionStatus {
        self.with_state(|s| s.statuses.get(order_id).copied().unwrap_or(PaymentSessionStatus::Pending))
    }

    fn report(&self, order_id: &str, status: PaymentSessionStatus) -> ProviderStatus {
        let raw_status = status.as_str().to_lowercase();
        let mut refs = Map::new();
        refs.insert("mock_order_id".into(), Value::String(order_id.to_string()));
        refs.insert("mock_status".into(), Value::String(raw_status.clone()));
        ProviderStatus {
            status,
            raw_status,
            provider_payment_id: Some(format!("pay_{order_id}")),
            provider_order_id: Some(order_id.to_string()),
            refs,
        }
    }

    async fn transition_upstream(
        &self,
        correlation_id: &str,
        order: &ProviderOrder,
        kind: CallKind,
        endpoint: &str,
        to: PaymentSessionStatus,
    ) -> Result<ProviderStatus, PaymentError> {
        let ctx = CallContext::new(correlation_id, &self.gateway_name, endpoint, kind);
        self.caller
            .call(&ctx, |_| {
                let outcome = self.begin_attempt(kind).map(|_| {
                    self.set_status(&order.provider_order_id, to);
                    self.report(&order.provider_order_id, to)
                });
                async move { outcome }
            })
            .await
    }
}

#[async_trait::async_trait]
impl PaymentGateway for MockGateway {
    fn id(&self) -> &str {
        &self.gateway_name
    }

    fn supports_refunds(&self) -> bool {
        self.refunds_enabled
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<String, PaymentError> {
        let ctx = CallContext::new(&request.correlation_id, &self.gateway_name, "/orders", CallKind::OrderCreate);
        self.caller
            .call(&ctx, |_| {
                let outcome = self.begin_attempt(CallKind::OrderCreate).map(|_| {
                    self.with_state(|s| {
                        s.orders_created += 1;
                        format!("order_{}", s.orders_created)
                    })
                });
                async move {
                    tokio::task::yield_now().await;
                    outcome
                }
            })
            .await
    }

    async fn fetch_status(&self, correlation_id: &str, order: &ProviderOrder) -> Result<ProviderStatus, PaymentError> {
        let ctx = CallContext::new(correlation_id, &self.gateway_name, "/orders/payments", CallKind::StatusPoll);
        self.caller
            .call(&ctx, |_| {
                let outcome = self
                    .begin_attempt(CallKind::StatusPoll)
                    .map(|_| self.report(&order.provider_order_id, self.status_of(&order.provider_order_id)));
                async move { outcome }
            })
            .await
    }

    async fn capture(
        &self,
        correlation_id: &str,
        _session: &PaymentSession,
        order: &ProviderOrder,
    ) -> Result<ProviderStatus, PaymentError> {
        self.transition_upstream(correlation_id, order, CallKind::Capture, "/payments/capture", PaymentSessionStatus::Captured)
            .await
    }

    async fn refund(
        &self,
        correlation_id: &str,
        _session: &PaymentSession,
        order: &ProviderOrder,
        _amount_minor: i64,
    ) -> Result<ProviderStatus, PaymentError> {
        if !self.refunds_enabled {
            return Err(PaymentError::not_supported(format!("{} does not support refunds", self.gateway_name))
                .with_correlation_id(correlation_id));
        }
        self.transition_upstream(correlation_id, order, CallKind::Refund, "/payments/refund", PaymentSessionStatus::Refunded)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::upstream::RetryPolicy;
    use std::time::Duration;

    fn gateway() -> MockGateway {
        MockGateway::new(
            "mock",
            UpstreamCaller::new(RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
            }),
        )
    }

    fn order_request() -> OrderRequest {
        OrderRequest {
            session_id: "ps_1".to_string(),
            provider_id: "mock".to_string(),
            amount_minor: 100,
            currency: "INR".to_string(),
            correlation_id: "c1".to_string(),
        }
    }

    #[tokio::test]
    async fn order_ids_are_sequential() {
        let gw = gateway();
        assert_eq!(gw.create_order(&order_request()).await.unwrap(), "order_1");
        assert_eq!(gw.create_order(&order_request()).await.unwrap(), "order_2");
        assert_eq!(gw.orders_created(), 2);
    }

    #[tokio::test]
    async fn scripted_failures_are_consumed_in_order() {
        let gw = gateway();
        gw.fail_next(CallKind::OrderCreate, &[400]);
        let err = gw.create_order(&order_request()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Upstream);
        assert_eq!(gw.create_order(&order_request()).await.unwrap(), "order_1");
        assert_eq!(gw.attempts(CallKind::OrderCreate), 2);
    }
}
