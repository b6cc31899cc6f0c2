//! Every outbound call to a payment provider goes through [`UpstreamCaller`]:
//! attempt logging, bounded exponential backoff with jitter, endpoint-aware
//! retry eligibility and classification into the canonical error taxonomy.

use crate::error::{ErrorKind, PaymentError};
use crate::sanitize;
use serde::Serialize;
use serde_json::{json, Value};
use std::future::Future;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    StatusPoll,
    OrderCreate,
    Capture,
    Refund,
}

impl CallKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CallKind::StatusPoll => "status_poll",
            CallKind::OrderCreate => "order_create",
            CallKind::Capture => "capture",
            CallKind::Refund => "refund",
        }
    }

    /// Mutating calls may charge or move money on the provider side.
    pub fn is_mutating(self) -> bool {
        !matches!(self, CallKind::StatusPoll)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamErrorKind {
    Auth,
    BadRequest,
    RateLimited,
    Server,
    Network,
}

pub fn classify(status: Option<u16>) -> UpstreamErrorKind {
    match status {
        None => UpstreamErrorKind::Network,
        Some(401) | Some(403) => UpstreamErrorKind::Auth,
        Some(429) => UpstreamErrorKind::RateLimited,
        Some(s) if s >= 500 => UpstreamErrorKind::Server,
        Some(_) => UpstreamErrorKind::BadRequest,
    }
}

/// One failed attempt as seen by the transport. `body` is redacted on
/// construction and again before it is attached to an error.
#[derive(Debug, Clone)]
pub struct UpstreamFailure {
    pub status: Option<u16>,
    pub body: Value,
    pub message: String,
}

impl UpstreamFailure {
    pub fn http(status: u16, raw_body: &str) -> Self {
        Self {
            status: Some(status),
            body: sanitize::redact_body(raw_body),
            message: format!("provider responded with HTTP {status}"),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self {
            status: None,
            body: Value::Null,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> UpstreamErrorKind {
        classify(self.status)
    }
}

impl From<reqwest::Error> for UpstreamFailure {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => UpstreamFailure {
                status: Some(status.as_u16()),
                body: Value::Null,
                message: e.to_string(),
            },
            None => UpstreamFailure::network(e.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_millis(2000),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &crate::config::AppConfig) -> Self {
        Self {
            max_attempts: cfg.upstream_max_attempts.max(1),
            base_delay: Duration::from_millis(cfg.upstream_base_delay_ms),
            max_delay: Duration::from_millis(cfg.upstream_max_delay_ms),
        }
    }

    /// Backoff before retry number `attempt` (1-based), without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(2_u32.pow(exp));
        delay.min(self.max_delay)
    }

    fn backoff_with_jitter(&self, attempt: u32) -> Duration {
        let base = self.backoff(attempt);
        let jitter_ms = (base.as_millis() as u64) / 2;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::random::<u64>() % (jitter_ms + 1))
    }
}

#[derive(Debug, Clone)]
pub struct CallContext<'a> {
    pub correlation_id: &'a str,
    pub provider: &'a str,
    pub endpoint: &'a str,
    pub kind: CallKind,
    /// Explicit opt-in to retry a mutating call on 429.
    pub retry_on_rate_limit: bool,
    /// Explicit opt-in to retry a mutating call on 5xx or a transport error.
    /// The provider may already have applied the first attempt.
    pub retry_on_server_error: bool,
}

impl<'a> CallContext<'a> {
    pub fn new(correlation_id: &'a str, provider: &'a str, endpoint: &'a str, kind: CallKind) -> Self {
        Self {
            correlation_id,
            provider,
            endpoint,
            kind,
            retry_on_rate_limit: !kind.is_mutating(),
            retry_on_server_error: !kind.is_mutating(),
        }
    }

    pub fn retry_on_rate_limit(mut self, enabled: bool) -> Self {
        self.retry_on_rate_limit = enabled;
        self
    }

    pub fn retry_on_server_error(mut self, enabled: bool) -> Self {
        self.retry_on_server_error = enabled;
        self
    }

    fn is_retryable(&self, failure: &UpstreamFailure) -> bool {
        match failure.kind() {
            UpstreamErrorKind::RateLimited => self.retry_on_rate_limit,
            UpstreamErrorKind::Server | UpstreamErrorKind::Network => self.retry_on_server_error,
            UpstreamErrorKind::Auth | UpstreamErrorKind::BadRequest => false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpstreamCaller {
    pub policy: RetryPolicy,
}

impl UpstreamCaller {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub async fn call<T, F, Fut>(&self, ctx: &CallContext<'_>, mut op: F) -> Result<T, PaymentError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, UpstreamFailure>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let start = Instant::now();
            tracing::debug!(
                correlation_id = ctx.correlation_id,
                provider = ctx.provider,
                endpoint = ctx.endpoint,
                kind = ctx.kind.as_str(),
                attempt,
                "upstream call started"
            );

            match op(attempt).await {
                Ok(value) => {
                    tracing::info!(
                        correlation_id = ctx.correlation_id,
                        provider = ctx.provider,
                        endpoint = ctx.endpoint,
                        attempt,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "upstream call succeeded"
                    );
                    return Ok(value);
                }
                Err(failure) => {
                    let retry = attempt < max_attempts && ctx.is_retryable(&failure);
                    tracing::warn!(
                        correlation_id = ctx.correlation_id,
                        provider = ctx.provider,
                        endpoint = ctx.endpoint,
                        attempt,
                        status = failure.status,
                        duration_ms = start.elapsed().as_millis() as u64,
                        will_retry = retry,
                        "upstream call failed: {}",
                        failure.message
                    );
                    if !retry {
                        return Err(into_error(failure, ctx, attempt));
                    }
                    tokio::time::sleep(self.policy.backoff_with_jitter(attempt)).await;
                }
            }
        }
    }
}

fn into_error(failure: UpstreamFailure, ctx: &CallContext<'_>, attempts: u32) -> PaymentError {
    let kind = failure.kind();
    let details = json!({
        "provider": ctx.provider,
        "endpoint": ctx.endpoint,
        "call": ctx.kind,
        "attempts": attempts,
        "upstream_status": failure.status,
        "upstream_error": kind,
        "upstream_body": sanitize::redact(&failure.body),
    });

    let err = match kind {
        UpstreamErrorKind::RateLimited => PaymentError::new(
            ErrorKind::RateLimited,
            format!("{} rate limited {}", ctx.provider, ctx.endpoint),
        ),
        UpstreamErrorKind::Auth => PaymentError::new(
            ErrorKind::Upstream,
            format!("{} rejected our credentials on {}", ctx.provider, ctx.endpoint),
        )
        .with_code("UPSTREAM_AUTH_FAILED"),
        UpstreamErrorKind::BadRequest => PaymentError::new(
            ErrorKind::Upstream,
            format!("{} rejected the request to {}", ctx.provider, ctx.endpoint),
        )
        .with_code("UPSTREAM_BAD_REQUEST"),
        UpstreamErrorKind::Server | UpstreamErrorKind::Network => PaymentError::new(
            ErrorKind::Upstream,
            format!("{} failed on {}: {}", ctx.provider, ctx.endpoint, failure.message),
        ),
    };

    err.with_details(details)
        .with_correlation_id(ctx.correlation_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_caller(max_attempts: u32) -> UpstreamCaller {
        UpstreamCaller::new(RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        })
    }

    #[test]
    fn classifies_by_status() {
        assert_eq!(classify(Some(401)), UpstreamErrorKind::Auth);
        assert_eq!(classify(Some(403)), UpstreamErrorKind::Auth);
        assert_eq!(classify(Some(400)), UpstreamErrorKind::BadRequest);
        assert_eq!(classify(Some(429)), UpstreamErrorKind::RateLimited);
        assert_eq!(classify(Some(503)), UpstreamErrorKind::Server);
        assert_eq!(classify(None), UpstreamErrorKind::Network);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(p.backoff(1), Duration::from_millis(100));
        assert_eq!(p.backoff(2), Duration::from_millis(200));
        assert_eq!(p.backoff(3), Duration::from_millis(350));
        assert_eq!(p.backoff(30), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn bad_request_is_not_retried() {
        let caller = fast_caller(3);
        let calls = AtomicU32::new(0);
        let ctx = CallContext::new("c1", "mock", "/v1/payments", CallKind::StatusPoll);
        let res: Result<(), _> = caller
            .call(&ctx, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(UpstreamFailure::http(400, r#"{"error":{"description":"bad"}}"#)) }
            })
            .await;
        let err = res.unwrap_err();
        assert_eq!(err.code, "UPSTREAM_BAD_REQUEST");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_server_errors_surface_as_upstream_error() {
        let caller = fast_caller(2);
        let ctx = CallContext::new("c2", "mock", "/v1/orders/:id/payments", CallKind::StatusPoll);
        let err = caller
            .call::<(), _, _>(&ctx, |_| async { Err(UpstreamFailure::http(502, "bad gateway")) })
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Upstream);
        assert_eq!(err.details["attempts"], 2);
        assert_eq!(err.correlation_id.as_deref(), Some("c2"));
    }

    #[tokio::test]
    async fn upstream_body_is_redacted_in_details() {
        let caller = fast_caller(1);
        let ctx = CallContext::new("c3", "mock", "/v1/orders", CallKind::OrderCreate);
        let err = caller
            .call::<(), _, _>(&ctx, |_| async {
                Err(UpstreamFailure::http(401, r#"{"key_secret":"leaked","email":"x@y.z"}"#))
            })
            .await
            .unwrap_err();
        let rendered = err.details.to_string();
        assert!(!rendered.contains("leaked"));
        assert!(!rendered.contains("x@y.z"));
        assert_eq!(err.code, "UPSTREAM_AUTH_FAILED");
    }

    #[tokio::test]
    async fn mutating_call_can_opt_into_rate_limit_retry() {
        let caller = fast_caller(3);
        let calls = AtomicU32::new(0);
        let ctx = CallContext::new("c4", "mock", "/v1/payments/capture", CallKind::Capture)
            .retry_on_rate_limit(true);
        let out = caller
            .call(&ctx, |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 1 {
                        Err(UpstreamFailure::http(429, ""))
                    } else {
                        Ok("captured")
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(out, "captured");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn mutating_calls_are_sent_once_on_server_errors() {
        let caller = fast_caller(3);
        for kind in [CallKind::OrderCreate, CallKind::Capture, CallKind::Refund] {
            let calls = AtomicU32::new(0);
            let ctx = CallContext::new("c5", "mock", "/v1/payments/refund", kind);
            let err = caller
                .call::<(), _, _>(&ctx, |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(UpstreamFailure::network("connection reset")) }
                })
                .await
                .unwrap_err();
            assert_eq!(err.details["attempts"], 1);
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }

        let calls = AtomicU32::new(0);
        let ctx = CallContext::new("c6", "mock", "/v1/orders", CallKind::OrderCreate)
            .retry_on_server_error(true);
        let out = caller
            .call(&ctx, |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 1 {
                        Err(UpstreamFailure::http(503, ""))
                    } else {
                        Ok("order_1")
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(out, "order_1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn form_encoded_error_bodies_do_not_leak() {
        let caller = fast_caller(1);
        let ctx = CallContext::new("c7", "mock", "/v1/orders", CallKind::OrderCreate);
        let err = caller
            .call::<(), _, _>(&ctx, |_| async {
                Err(UpstreamFailure::http(400, "key_secret=rzp_live_SECRET&email=a@b.c"))
            })
            .await
            .unwrap_err();
        let rendered = err.details.to_string();
        assert!(!rendered.contains("rzp_live_SECRET"));
        assert!(!rendered.contains("a@b.c"));
        assert_eq!(err.details["upstream_body"]["key_secret"], crate::sanitize::REDACTED);
    }
}
