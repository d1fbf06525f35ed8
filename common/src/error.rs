//! Error kinds shared across the billing core, and the wire-level envelope
//! they collapse into at the API boundary.
//!
//! Grounded in the teacher's `common::api::error` module: each service layer
//! gets its own `thiserror` enum, and every enum implements [`ToHttpStatus`]
//! so the API layer never has to re-derive a status code from a string. We
//! drop the teacher's macro-generated `ErrorKind`/`ErrorCode` registry (it
//! exists there to keep wire-compatible error codes across independently
//! versioned enclave/client builds, a constraint this single-deployment core
//! doesn't have) in favor of plain enums.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maps a service error to the HTTP status it should surface as (spec §7).
pub trait ToHttpStatus {
    fn to_http_status(&self) -> StatusCode;
}

/// The only error struct actually sent across the wire for non-webhook
/// endpoints. Never includes secrets, stack traces, or raw provider
/// responses (spec §7 propagation policy).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

/// Errors raised by the ledger store / balance service (C1 / C2).
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("idempotency key already processed: {0}")]
    DuplicatePayment(String),

    #[error("insufficient balance: have {current}, need {required}")]
    InsufficientBalance { current: Decimal, required: Decimal },

    #[error("account not found")]
    AccountNotFound,

    #[error("database error: {0}")]
    Database(String),
}

impl ToHttpStatus for LedgerError {
    fn to_http_status(&self) -> StatusCode {
        match self {
            LedgerError::DuplicatePayment(_) => StatusCode::CONFLICT,
            LedgerError::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,
            LedgerError::AccountNotFound => StatusCode::NOT_FOUND,
            LedgerError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<LedgerError> for ErrorResponse {
    fn from(e: LedgerError) -> Self {
        let code = match &e {
            LedgerError::DuplicatePayment(_) => "duplicate_payment",
            LedgerError::InsufficientBalance { .. } => "insufficient_balance",
            LedgerError::AccountNotFound => "not_found",
            LedgerError::Database(_) => "internal_error",
        };
        ErrorResponse { code, message: e.to_string() }
    }
}

/// The stable set of error codes a [`PaymentProvider`] adapter can surface,
/// per spec §4.4's retryability table.
///
/// [`PaymentProvider`]: providers crate
#[derive(Copy, Clone, Debug, Eq, PartialEq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ProviderErrorCode {
    ClientError,
    ServerError,
    Timeout,
    MaxRetries,
    NotFound,
}

impl ProviderErrorCode {
    /// Whether an HTTP response carrying this code should be retried (spec
    /// §4.4: 5xx, 429, and network/timeout errors are retryable; other 4xx
    /// are not).
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::ServerError | Self::Timeout)
    }
}

#[derive(Debug, Clone, Error)]
#[error("provider error [{code}]: {message}")]
pub struct ProviderError {
    pub code: ProviderErrorCode,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

impl ToHttpStatus for ProviderError {
    fn to_http_status(&self) -> StatusCode {
        match self.code {
            ProviderErrorCode::ClientError => StatusCode::BAD_GATEWAY,
            ProviderErrorCode::ServerError => StatusCode::BAD_GATEWAY,
            ProviderErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ProviderErrorCode::MaxRetries => StatusCode::BAD_GATEWAY,
            ProviderErrorCode::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl From<ProviderError> for ErrorResponse {
    fn from(e: ProviderError) -> Self {
        ErrorResponse { code: "provider_error", message: e.message.clone() }
    }
}

/// Raised by webhook signature verification (C4 / C5). Never surfaces as a
/// non-200 HTTP status: inviting retries of a forged payload is worse than
/// swallowing it, so the API layer maps this to a 200 `{status: "error"}` ack
/// and logs at WARN (spec §7).
#[derive(Debug, Clone, Error)]
pub enum WebhookError {
    #[error("missing or malformed signature header")]
    MalformedSignature,

    #[error("signature timestamp outside replay window")]
    ReplayWindowExceeded,

    /// Message text matches spec §8 scenario 4's literal forged-webhook
    /// response body verbatim: `{status:"error", message:"Invalid signature"}`.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The signature verified, but applying the event's ledger effect
    /// failed for an unrelated reason (e.g. the account row vanished, or a
    /// database error). Still acked as 200 (spec §7: a webhook never
    /// surfaces a non-200 for anything short of a routing miss, so the
    /// provider doesn't retry into a pile of duplicate attempts), but kept
    /// distinct from [`WebhookError::InvalidSignature`] so logs don't
    /// conflate a forged payload with an honest backend failure.
    #[error("failed to apply verified webhook event: {0}")]
    ApplyFailed(String),
}

#[derive(Debug, Clone, Error)]
#[error("validation error on field `{field}`: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

impl ToHttpStatus for ValidationError {
    fn to_http_status(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }
}

impl From<ValidationError> for ErrorResponse {
    fn from(e: ValidationError) -> Self {
        ErrorResponse { code: "validation_error", message: e.to_string() }
    }
}

/// Raised by the credential service (C7).
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("missing or malformed credentials")]
    Unauthorized,

    #[error("required scope `{0}` not granted")]
    Forbidden(String),

    #[error("too many authentication failures, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
}

impl ToHttpStatus for AuthError {
    fn to_http_status(&self) -> StatusCode {
        match self {
            AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
            AuthError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

impl From<AuthError> for ErrorResponse {
    fn from(e: AuthError) -> Self {
        let code = match &e {
            AuthError::Unauthorized => "unauthorized",
            AuthError::Forbidden(_) => "forbidden",
            AuthError::RateLimited { .. } => "rate_limited",
        };
        ErrorResponse { code, message: e.to_string() }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.to_http_status();
        let body: ErrorResponse = self.into();
        (status, Json(body)).into_response()
    }
}

/// The top-level error type returned by the API layer, aggregating every
/// service error kind into one enum so a single `IntoResponse` impl below
/// can cover every handler in the `api` crate.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("not found")]
    NotFound,
    #[error("internal error")]
    Internal(String),
}

impl ToHttpStatus for CoreError {
    fn to_http_status(&self) -> StatusCode {
        match self {
            CoreError::Ledger(e) => e.to_http_status(),
            CoreError::Provider(e) => e.to_http_status(),
            CoreError::Validation(e) => e.to_http_status(),
            CoreError::Auth(e) => e.to_http_status(),
            CoreError::NotFound => StatusCode::NOT_FOUND,
            CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CoreError> for ErrorResponse {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Ledger(e) => e.into(),
            CoreError::Provider(e) => e.into(),
            CoreError::Validation(e) => e.into(),
            CoreError::Auth(e) => e.into(),
            CoreError::NotFound => ErrorResponse { code: "not_found", message: "not found".into() },
            CoreError::Internal(msg) => ErrorResponse { code: "internal_error", message: msg },
        }
    }
}

/// The one place `CoreError` becomes an HTTP response, so every handler in
/// the `api` crate can return `Result<T, CoreError>` directly instead of
/// mapping errors by hand at each call site.
impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = self.to_http_status();
        let body: ErrorResponse = self.into();
        (status, Json(body)).into_response()
    }
}

/// Webhook handlers never surface a non-200 status for a verification
/// failure -- that would invite the sender to retry a forged payload (spec
/// §7). The API layer acks with `{status: "error", message}` instead.
impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        match &self {
            WebhookError::ApplyFailed(_) => tracing::error!(error = %self, "webhook apply failed"),
            _ => tracing::warn!(error = %self, "webhook verification failed"),
        }
        (StatusCode::OK, Json(serde_json::json!({ "status": "error", "message": self.to_string() }))).into_response()
    }
}
