//! The card provider adapter (C4): checkout creation over a retrying REST
//! client, and HMAC-signed webhook verification and dispatch.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use billing_common::error::{ProviderError, ProviderErrorCode, WebhookError};
use billing_common::ids::AccountRef;
use billing_ledger::{BalanceService, NewTransaction, TransactionType};
use chrono::Utc;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use crate::registry::{
    parse_account_ref, CheckoutRequest, CheckoutResult, PaymentProvider, ProviderName, WebhookEvent, WebhookOutcome,
};
use crate::rest_client::RestClient;

const REPLAY_WINDOW: Duration = Duration::from_secs(5 * 60);

pub struct CardProvider {
    rest: RestClient,
    api_base: String,
    api_key: String,
    webhook_secret: String,
    balance: BalanceService,
}

impl CardProvider {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>, webhook_secret: impl Into<String>, balance: BalanceService) -> Self {
        Self {
            rest: RestClient::new("billing-core", "card-provider", Duration::from_secs(30)),
            api_base: api_base.into(),
            api_key: api_key.into(),
            webhook_secret: webhook_secret.into(),
            balance,
        }
    }

    fn custom_data(request: &CheckoutRequest) -> serde_json::Value {
        json!({
            "account_ref": request.account_ref.to_string(),
            "idempotency_key": request.idempotency_key,
            "amount_usd": request.amount_usd.to_string(),
        })
    }

    fn parse_signature_header(header: &str) -> Option<(i64, String)> {
        let mut ts = None;
        let mut h1 = None;
        for part in header.split(';') {
            let (key, value) = part.split_once('=')?;
            match key.trim() {
                "ts" => ts = value.trim().parse::<i64>().ok(),
                "h1" => h1 = Some(value.trim().to_string()),
                _ => {}
            }
        }
        Some((ts?, h1?))
    }
}

#[async_trait]
impl PaymentProvider for CardProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Card
    }

    async fn create_checkout(&self, request: CheckoutRequest) -> Result<CheckoutResult, ProviderError> {
        let body = json!({
            "amount": request.amount_usd.to_string(),
            "currency": "usd",
            "success_url": request.success_url,
            "cancel_url": request.cancel_url,
            "custom_data": Self::custom_data(&request).to_string(),
        });
        let req = self
            .rest
            .post_json(&format!("{}/checkouts", self.api_base), &body)
            .bearer_auth(&self.api_key)
            .header("Idempotency-Key", request.idempotency_key.clone());

        let response: CardCheckoutResponse = self.rest.send_with_retries(req).await?;
        Ok(CheckoutResult {
            payment_id: response.id,
            status: response.status,
            checkout_url: Some(response.url),
            invoice_blob: None,
            expires_at: response.expires_at,
            metadata: json!({}),
        })
    }

    fn verify_webhook(&self, event: &WebhookEvent) -> Result<(), WebhookError> {
        let header = event.header("card-signature").ok_or(WebhookError::MalformedSignature)?;
        let (ts, h1) = Self::parse_signature_header(header).ok_or(WebhookError::MalformedSignature)?;

        let now = SystemTime::now().duration_since(UNIX_EPOCH).expect("clock before epoch").as_secs() as i64;
        if (now - ts).unsigned_abs() > REPLAY_WINDOW.as_secs() {
            return Err(WebhookError::ReplayWindowExceeded);
        }

        let mut mac = Hmac::<Sha256>::new_from_slice(self.webhook_secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(ts.to_string().as_bytes());
        mac.update(b":");
        mac.update(&event.raw_body);
        let expected = mac.finalize().into_bytes();
        let expected_hex = hex::encode(expected);

        if expected_hex.as_bytes().ct_eq(h1.as_bytes()).unwrap_u8() != 1 {
            return Err(WebhookError::InvalidSignature);
        }
        Ok(())
    }

    async fn process_webhook(&self, event: &WebhookEvent) -> Result<WebhookOutcome, WebhookError> {
        self.verify_webhook(event)?;

        let payload: CardWebhookPayload =
            serde_json::from_slice(&event.raw_body).map_err(|_| WebhookError::MalformedSignature)?;

        match payload.event_type.as_str() {
            "transaction.completed" => {
                let Some(custom_data) = payload.parsed_custom_data() else {
                    warn!(event_id = %payload.event_id, "transaction.completed missing custom_data, ignoring");
                    return Ok(WebhookOutcome::NoOp);
                };
                let Some(account_ref) = parse_account_ref(&custom_data.account_ref) else {
                    warn!(event_id = %payload.event_id, "unparseable account_ref, ignoring");
                    return Ok(WebhookOutcome::NoOp);
                };
                let amount: Decimal = custom_data.amount_usd.parse().map_err(|_| WebhookError::MalformedSignature)?;
                let idempotency_key = custom_data
                    .idempotency_key
                    .clone()
                    .unwrap_or_else(|| format!("evt_{}", payload.event_id));
                let new_tx = NewTransaction::new(TransactionType::Topup, format!("card:{}", payload.event_id))
                    .with_external_id(payload.event_id.clone());
                let tx = self
                    .balance
                    .credit(&account_ref, amount, new_tx, &idempotency_key)
                    .await
                    .map_err(|e| WebhookError::ApplyFailed(e.to_string()))?;
                info!(idempotency_key, "card topup applied");
                Ok(WebhookOutcome::Applied(tx))
            }
            "transaction.refunded" => {
                let Some(custom_data) = payload.parsed_custom_data() else {
                    warn!(event_id = %payload.event_id, "transaction.refunded missing custom_data, ignoring");
                    return Ok(WebhookOutcome::NoOp);
                };
                let Some(account_ref) = parse_account_ref(&custom_data.account_ref) else {
                    warn!(event_id = %payload.event_id, "unparseable account_ref, ignoring");
                    return Ok(WebhookOutcome::NoOp);
                };
                // The refunded amount is the event's own figure, not the
                // original checkout total echoed back in `custom_data` -- a
                // partial refund would otherwise debit the full checkout
                // amount (mirrors `lemonsqueezy_provider.py`'s `order_data
                // ["total"]` read straight off the event body).
                let Some(refund_amount) = payload.refund_amount_usd.as_deref() else {
                    warn!(event_id = %payload.event_id, "transaction.refunded missing refund amount, ignoring");
                    return Ok(WebhookOutcome::NoOp);
                };
                let amount: Decimal = refund_amount.parse().map_err(|_| WebhookError::MalformedSignature)?;
                let idempotency_key = format!("refund_{}", payload.event_id);
                let new_tx = NewTransaction::new(TransactionType::Refund, format!("card:{}", payload.event_id))
                    .with_external_id(payload.event_id.clone());
                let tx = self
                    .balance
                    .debit(&account_ref, amount, new_tx, &idempotency_key)
                    .await
                    .map_err(|e| WebhookError::ApplyFailed(e.to_string()))?;
                Ok(WebhookOutcome::Applied(tx))
            }
            "transaction.payment_failed" => {
                info!(event_id = %payload.event_id, "payment failed, no ledger effect");
                let Some(custom_data) = payload.parsed_custom_data() else {
                    warn!(event_id = %payload.event_id, "transaction.payment_failed missing custom_data, cannot notify");
                    return Ok(WebhookOutcome::NoOp);
                };
                let Some(account_ref) = parse_account_ref(&custom_data.account_ref) else {
                    warn!(event_id = %payload.event_id, "unparseable account_ref, cannot notify");
                    return Ok(WebhookOutcome::NoOp);
                };
                Ok(WebhookOutcome::NotifyFailure { account_ref, reason: "payment failed".to_string() })
            }
            other => {
                warn!(event_type = other, "ignoring unrecognized card webhook event type");
                Ok(WebhookOutcome::NoOp)
            }
        }
    }

    async fn get_payment_status(&self, payment_id: &str) -> Result<String, ProviderError> {
        let req = self.rest.get(&format!("{}/checkouts/{payment_id}", self.api_base)).bearer_auth(&self.api_key);
        let response: CardCheckoutResponse = self.rest.send_with_retries(req).await?;
        Ok(response.status)
    }
}

#[derive(Debug, Deserialize)]
struct CardCheckoutResponse {
    id: String,
    status: String,
    url: String,
    expires_at: Option<chrono::DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct CardWebhookPayload {
    #[serde(rename = "type")]
    event_type: String,
    event_id: String,
    custom_data: Option<String>,
    /// The amount this specific event affects, as reported by the provider
    /// itself -- used for `transaction.refunded`, where it may be less than
    /// the original checkout total in `custom_data.amount_usd` (a partial
    /// refund).
    #[serde(rename = "amount_usd")]
    refund_amount_usd: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CustomData {
    account_ref: String,
    idempotency_key: Option<String>,
    amount_usd: String,
}

impl CardWebhookPayload {
    fn parsed_custom_data(&self) -> Option<CustomData> {
        self.custom_data.as_ref().and_then(|s| serde_json::from_str(s).ok())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_signature_header() {
        let header = "ts=1700000000;h1=abcdef0123";
        let (ts, h1) = CardProvider::parse_signature_header(header).unwrap();
        assert_eq!(ts, 1700000000);
        assert_eq!(h1, "abcdef0123");
    }

    #[test]
    fn rejects_malformed_signature_header() {
        assert!(CardProvider::parse_signature_header("garbage").is_none());
        assert!(CardProvider::parse_signature_header("ts=abc;h1=x").is_none());
    }

    #[test]
    fn parses_account_ref_variants() {
        assert_eq!(parse_account_ref("chat:42"), Some(AccountRef::ExternalChatId(42)));
        assert_eq!(parse_account_ref("email:a@example.com"), Some(AccountRef::Email("a@example.com".into())));
        assert!(parse_account_ref("not-a-ref").is_none());
    }
}
