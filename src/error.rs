use crate::domain::payment::{ErrorEnvelope, ErrorPayload};
use axum::http::StatusCode;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    SignatureInvalid,
    ProviderUnavailable,
    RateLimited,
    Upstream,
    InvalidTransition,
    NotSupported,
    ImmutableOrderFields,
    NotFound,
    Storage,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::SignatureInvalid => "SIGNATURE_INVALID",
            ErrorKind::ProviderUnavailable => "PROVIDER_UNAVAILABLE",
            ErrorKind::RateLimited => "RATE_LIMITED",
            ErrorKind::Upstream => "UPSTREAM_ERROR",
            ErrorKind::InvalidTransition => "STATE_TRANSITION_INVALID",
            ErrorKind::NotSupported => "NOT_SUPPORTED",
            ErrorKind::ImmutableOrderFields => "IMMUTABLE_ORDER_FIELDS",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Storage => "STORAGE_ERROR",
        }
    }

    pub fn http_status(self) -> StatusCode {
        match self {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::SignatureInvalid => StatusCode::UNAUTHORIZED,
            ErrorKind::ProviderUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
            ErrorKind::InvalidTransition => StatusCode::CONFLICT,
            ErrorKind::NotSupported => StatusCode::NOT_IMPLEMENTED,
            ErrorKind::ImmutableOrderFields => StatusCode::CONFLICT,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Domain error surfaced to every caller of the engine.
///
/// `details` must already be free of secrets and PII; raw upstream bodies only
/// reach it through [`crate::sanitize::redact`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct PaymentError {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
    pub details: Value,
    pub correlation_id: Option<String>,
}

impl PaymentError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: kind.code().to_string(),
            message: message.into(),
            details: Value::Null,
            correlation_id: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn signature_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SignatureInvalid, message)
    }

    pub fn provider_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ProviderUnavailable, message)
    }

    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotSupported, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Storage, message)
    }

    /// Replaces the kind's default code with a more specific one
    /// (e.g. `WEBHOOK_SIGNATURE_MISMATCH`).
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Fills in the correlation id only if an inner layer did not already set one.
    pub fn or_correlation_id(mut self, correlation_id: &str) -> Self {
        if self.correlation_id.is_none() {
            self.correlation_id = Some(correlation_id.to_string());
        }
        self
    }

    pub fn http_status(&self) -> StatusCode {
        self.kind.http_status()
    }

    pub fn to_envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            error: ErrorPayload {
                code: self.code.clone(),
                message: self.message.clone(),
                details: if self.details.is_null() {
                    None
                } else {
                    Some(self.details.clone())
                },
                correlation_id: self.correlation_id.clone(),
            },
        }
    }
}

impl From<sqlx::Error> for PaymentError {
    fn from(e: sqlx::Error) -> Self {
        PaymentError::storage(e.to_string())
    }
}

impl From<anyhow::Error> for PaymentError {
    fn from(e: anyhow::Error) -> Self {
        PaymentError::storage(e.to_string())
    }
}

impl axum::response::IntoResponse for PaymentError {
    fn into_response(self) -> axum::response::Response {
        let status = self.http_status();
        if status.is_server_error() {
            tracing::error!(correlation_id = ?self.correlation_id, code = %self.code, "{}", self.message);
        } else {
            tracing::warn!(correlation_id = ?self.correlation_id, code = %self.code, "{}", self.message);
        }
        (status, axum::Json(self.to_envelope())).into_response()
    }
}
