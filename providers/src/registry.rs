//! The provider contract (C3): a trait every adapter implements, and a
//! registry that dispatches to the right one by a closed enum instead of a
//! string method name (spec §9 redesign flag).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use billing_common::error::{ProviderError, WebhookError};
use billing_common::ids::AccountRef;
use billing_common::metrics::Metrics;
use billing_ledger::Transaction;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// The fixed set of providers this core integrates with. Unlike the
/// distilled spec's free-form provider-name string, adding a provider means
/// adding a variant here, so dispatch is exhaustive at compile time.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderName {
    Card,
    Wallet,
}

impl ProviderName {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderName::Card => "card",
            ProviderName::Wallet => "wallet",
        }
    }
}

impl std::str::FromStr for ProviderName {
    type Err = ProviderError;

    /// Parses the `method` field of a topup request and the `<provider>`
    /// path segment of a webhook route (spec §4.3/§6) into a closed variant.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "card" => Ok(ProviderName::Card),
            "wallet" => Ok(ProviderName::Wallet),
            other => Err(ProviderError::new(
                billing_common::error::ProviderErrorCode::NotFound,
                format!("unknown provider `{other}`"),
            )),
        }
    }
}

impl std::fmt::Display for ProviderName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub account_ref: AccountRef,
    pub amount_usd: Decimal,
    pub idempotency_key: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutResult {
    pub payment_id: String,
    pub status: String,
    pub checkout_url: Option<String>,
    pub invoice_blob: Option<Json>,
    pub expires_at: Option<DateTime<Utc>>,
    pub metadata: Json,
}

/// A raw inbound webhook/callback delivery: the undecoded body plus whatever
/// headers the adapter needs to verify it. `headers` keys are lowercased.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub raw_body: Vec<u8>,
    pub headers: HashMap<String, String>,
}

/// What happened when a verified webhook event was processed.
#[derive(Debug, Clone)]
pub enum WebhookOutcome {
    /// A ledger transaction was applied.
    Applied(Transaction),
    /// Recognized event type, no ledger effect, nothing to tell the user.
    NoOp,
    /// Recognized event type, no ledger effect, but the user should be
    /// notified (spec §4.4 `transaction.payment_failed`: "no ledger effect;
    /// notify user; record metric").
    NotifyFailure { account_ref: AccountRef, reason: String },
}

impl WebhookEvent {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Parses an `AccountRef` back out of its `Display` form (`chat:<id>`,
/// `email:<addr>`, or a bare UUID), shared by both adapters' webhook
/// payloads (spec §4.4 custom_data, §4.5 payload).
pub fn parse_account_ref(s: &str) -> Option<AccountRef> {
    if let Some(rest) = s.strip_prefix("chat:") {
        return rest.parse::<i64>().ok().map(AccountRef::ExternalChatId);
    }
    if let Some(rest) = s.strip_prefix("email:") {
        return Some(AccountRef::Email(rest.to_string()));
    }
    uuid::Uuid::parse_str(s).ok().map(|id| AccountRef::Id(id.into()))
}

/// The common adapter contract every provider implements (spec §4.3).
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn name(&self) -> ProviderName;

    async fn create_checkout(&self, request: CheckoutRequest) -> Result<CheckoutResult, ProviderError>;

    /// Cryptographically verifies `event`'s signature against the raw body.
    /// Must be called, and must succeed, before `process_webhook` applies
    /// any ledger effect.
    fn verify_webhook(&self, event: &WebhookEvent) -> Result<(), billing_common::error::WebhookError>;

    /// Verifies then applies `event`. Returns the outcome -- an applied
    /// transaction, a no-op, or a failure the user should be notified of --
    /// or a `WebhookError` if verification failed.
    async fn process_webhook(
        &self,
        event: &WebhookEvent,
    ) -> Result<WebhookOutcome, billing_common::error::WebhookError>;

    async fn get_payment_status(&self, payment_id: &str) -> Result<String, ProviderError>;

    /// Out-of-band refund initiation against the provider itself (as opposed
    /// to the REFUND ledger entry applied from an inbound webhook). Optional;
    /// most providers only support refunds via their own dashboard, so the
    /// default rejects with `ClientError` rather than forcing every adapter
    /// to implement it (spec §4.3).
    async fn refund(&self, payment_id: &str, amount: Option<Decimal>) -> Result<(), ProviderError> {
        let _ = amount;
        Err(ProviderError::new(
            billing_common::error::ProviderErrorCode::ClientError,
            format!("{} does not support provider-initiated refunds for {payment_id}", self.name()),
        ))
    }
}

/// Holds one adapter per [`ProviderName`], constructed once at startup and
/// threaded through the application context (spec §4.3 expansion).
#[derive(Clone)]
pub struct ProviderRegistry {
    card: Arc<dyn PaymentProvider>,
    wallet: Arc<dyn PaymentProvider>,
}

impl ProviderRegistry {
    pub fn new(card: Arc<dyn PaymentProvider>, wallet: Arc<dyn PaymentProvider>) -> Self {
        Self { card, wallet }
    }

    pub fn get(&self, name: ProviderName) -> &Arc<dyn PaymentProvider> {
        match name {
            ProviderName::Card => &self.card,
            ProviderName::Wallet => &self.wallet,
        }
    }

    /// Dispatch `create_checkout` to the provider named by `request.method`
    /// (spec §4.3 "routes `create_payment` by `request.method`"), recording
    /// request/success/failure counters along the way.
    pub async fn create_payment(
        &self,
        method: ProviderName,
        request: CheckoutRequest,
        metrics: &dyn Metrics,
    ) -> Result<CheckoutResult, ProviderError> {
        metrics.record_provider_call(method.as_str(), "request");
        match self.get(method).create_checkout(request).await {
            Ok(result) => {
                metrics.record_provider_call(method.as_str(), "success");
                Ok(result)
            }
            Err(e) => {
                metrics.record_provider_call(method.as_str(), "failure");
                Err(e)
            }
        }
    }

    /// Dispatch a webhook delivered on the URL path for `provider` (spec
    /// §4.3 "routes webhooks by URL path, one path per provider"). The
    /// adapter itself verifies the signature before any ledger effect.
    pub async fn dispatch_webhook(
        &self,
        provider: ProviderName,
        event: &WebhookEvent,
        metrics: &dyn Metrics,
    ) -> Result<WebhookOutcome, WebhookError> {
        let result = self.get(provider).process_webhook(event).await;
        let outcome = match &result {
            Ok(WebhookOutcome::Applied(_)) => "applied",
            Ok(WebhookOutcome::NoOp) => "noop",
            Ok(WebhookOutcome::NotifyFailure { .. }) => "payment_failed",
            Err(_) => "invalid_signature",
        };
        metrics.record_webhook(provider.as_str(), "webhook", outcome);
        result
    }
}
