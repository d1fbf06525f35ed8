//! The wallet (Star) provider adapter (C5): invoice generation, a
//! pre-checkout approval callback, and a completion callback, backed by two
//! TTL caches instead of the ledger (spec §4.5).

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use billing_common::error::{ProviderError, ProviderErrorCode, WebhookError};
use billing_common::ids::AccountRef;
use billing_ledger::{BalanceService, NewTransaction, Transaction, TransactionType};
use moka::future::Cache;
use rand::RngCore;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use serde_json::json;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use crate::registry::{
    parse_account_ref, CheckoutRequest, CheckoutResult, PaymentProvider, ProviderName, WebhookEvent, WebhookOutcome,
};

const PENDING_TTL: Duration = Duration::from_secs(60 * 60);
const PROCESSED_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
/// 50 stars = $1 (spec §4.5).
const STARS_PER_USD: u64 = 50;

#[derive(Clone)]
struct PendingPayment {
    account_ref: AccountRef,
    stars: u64,
    usd_amount: Decimal,
}

pub struct WalletProvider {
    bot_token: String,
    balance: BalanceService,
    pending: Cache<String, PendingPayment>,
    processed: Cache<String, ()>,
}

impl WalletProvider {
    pub fn new(bot_token: impl Into<String>, balance: BalanceService) -> Self {
        Self {
            bot_token: bot_token.into(),
            balance,
            pending: Cache::builder().time_to_live(PENDING_TTL).build(),
            processed: Cache::builder().time_to_live(PROCESSED_TTL).build(),
        }
    }

    fn generate_payload(account_ref: &AccountRef) -> String {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).expect("clock before epoch").as_secs();
        let mut random_bytes = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut random_bytes);
        format!("topup:{account_ref}:{now}:{}", hex::encode(random_bytes))
    }

    /// Approve or reject a platform pre-checkout query (spec §4.5). No
    /// ledger write happens here.
    pub async fn handle_pre_checkout(&self, payload: &str, claimed_account: &AccountRef) -> Result<(), String> {
        let pending = self.pending.get(payload).await.ok_or_else(|| "unknown or expired invoice".to_string())?;
        if &pending.account_ref != claimed_account {
            return Err("account mismatch".to_string());
        }
        Ok(())
    }

    /// Apply a successful-payment notification (spec §4.5). Idempotent on
    /// `charge_id`.
    pub async fn handle_completion(
        &self,
        charge_id: &str,
        payload: &str,
        stars: u64,
    ) -> Result<Option<Transaction>, ProviderError> {
        if self.processed.get(charge_id).await.is_some() {
            info!(charge_id, "wallet completion already processed, no-op");
            return Ok(None);
        }

        let pending = self.pending.get(payload).await;
        let (account_ref, usd_amount) = match &pending {
            Some(p) => (p.account_ref.clone(), p.usd_amount),
            None => {
                // No PendingPayment survives (cache evicted, TTL expired, or
                // restart). The payload itself still carries the account
                // ref, so derive the credit from the stars ratio instead of
                // refusing the payment outright (spec §4.5).
                warn!(charge_id, "no pending entry for payload, deriving amount from stars ratio");
                let account_ref = parse_payload_account_ref(payload)
                    .ok_or_else(|| ProviderError::new(ProviderErrorCode::NotFound, "no pending payment for payload"))?;
                (account_ref, stars_to_usd(stars))
            }
        };

        let new_tx =
            NewTransaction::new(TransactionType::Topup, format!("wallet:{charge_id}")).with_external_id(charge_id.to_string());
        let tx = self
            .balance
            .credit(&account_ref, usd_amount, new_tx, charge_id)
            .await
            .map_err(|e| ProviderError::new(ProviderErrorCode::ServerError, e.to_string()))?;

        self.processed.insert(charge_id.to_string(), ()).await;
        self.pending.invalidate(payload).await;
        Ok(Some(tx))
    }
}

/// Recovers the `account_ref` encoded in a `topup:<account_ref>:<ts>:<rand>`
/// payload. `account_ref`'s own `Display` form (e.g. `email:a@b.com`) may
/// itself contain colons, so peel the two trailing `:`-delimited segments
/// (random, timestamp) off the right rather than splitting from the left.
fn parse_payload_account_ref(payload: &str) -> Option<AccountRef> {
    let rest = payload.strip_prefix("topup:")?;
    let (rest, _random) = rest.rsplit_once(':')?;
    let (account_part, _timestamp) = rest.rsplit_once(':')?;
    parse_account_ref(account_part)
}

pub fn usd_to_stars(usd: Decimal) -> u64 {
    (usd * Decimal::from(STARS_PER_USD)).round().try_into().unwrap_or(0)
}

pub fn stars_to_usd(stars: u64) -> Decimal {
    billing_common::money::round_usd(Decimal::from(stars) / Decimal::from(STARS_PER_USD))
}

#[async_trait]
impl PaymentProvider for WalletProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Wallet
    }

    async fn create_checkout(&self, request: CheckoutRequest) -> Result<CheckoutResult, ProviderError> {
        if request.amount_usd < dec!(0) {
            return Err(ProviderError::new(ProviderErrorCode::ClientError, "amount_usd must be non-negative"));
        }
        let payload = Self::generate_payload(&request.account_ref);
        let stars = usd_to_stars(request.amount_usd);
        self.pending
            .insert(
                payload.clone(),
                PendingPayment { account_ref: request.account_ref.clone(), stars, usd_amount: request.amount_usd },
            )
            .await;

        let invoice_blob = json!({
            "title": "Account top-up",
            "description": format!("Add ${} to your balance", request.amount_usd),
            "payload": payload,
            "currency": "XTR",
            "prices": [{ "label": "Top-up", "amount": stars }],
        });

        Ok(CheckoutResult {
            payment_id: payload,
            status: "pending".to_string(),
            checkout_url: None,
            invoice_blob: Some(invoice_blob),
            expires_at: None,
            metadata: json!({ "stars": stars }),
        })
    }

    fn verify_webhook(&self, event: &WebhookEvent) -> Result<(), WebhookError> {
        let token = event.header("x-wallet-bot-token").ok_or(WebhookError::MalformedSignature)?;
        if token.as_bytes().ct_eq(self.bot_token.as_bytes()).unwrap_u8() != 1 {
            return Err(WebhookError::InvalidSignature);
        }
        Ok(())
    }

    async fn process_webhook(&self, event: &WebhookEvent) -> Result<WebhookOutcome, WebhookError> {
        self.verify_webhook(event)?;
        let payload: WalletCompletionPayload =
            serde_json::from_slice(&event.raw_body).map_err(|_| WebhookError::MalformedSignature)?;

        let result = self
            .handle_completion(&payload.charge_id, &payload.payload, payload.stars)
            .await
            .map_err(|e| WebhookError::ApplyFailed(e.to_string()))?;

        Ok(match result {
            Some(tx) => WebhookOutcome::Applied(tx),
            None => WebhookOutcome::NoOp,
        })
    }

    async fn get_payment_status(&self, payment_id: &str) -> Result<String, ProviderError> {
        if self.pending.get(payment_id).await.is_some() {
            Ok("pending".to_string())
        } else {
            Ok("unknown".to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
struct WalletCompletionPayload {
    charge_id: String,
    payload: String,
    stars: u64,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn star_conversion_round_trips_at_whole_dollars() {
        assert_eq!(usd_to_stars(dec!(1)), 50);
        assert_eq!(stars_to_usd(50), dec!(1));
        assert_eq!(usd_to_stars(dec!(10)), 500);
    }

    #[test]
    fn parses_account_ref_back_out_of_payload() {
        let id = AccountRef::Id(uuid::Uuid::new_v4().into());
        let payload = WalletProvider::generate_payload(&id);
        assert_eq!(parse_payload_account_ref(&payload), Some(id));

        let email = AccountRef::Email("a@example.com".to_string());
        let payload = WalletProvider::generate_payload(&email);
        assert_eq!(parse_payload_account_ref(&payload), Some(email));

        let chat = AccountRef::ExternalChatId(42);
        let payload = WalletProvider::generate_payload(&chat);
        assert_eq!(parse_payload_account_ref(&payload), Some(chat));
    }

    use proptest::prelude::*;

    proptest! {
        /// `stars_to_usd(usd_to_stars(x)) == x` for multiples of `0.02`, the
        /// smallest USD amount that lands on a whole number of stars at the
        /// fixed 50-stars-per-dollar ratio (spec §8).
        #[test]
        fn star_round_trip_holds_for_two_cent_multiples(cents in 1i64..100_000i64) {
            let usd = Decimal::new(cents * 2, 2);
            let stars = usd_to_stars(usd);
            prop_assert_eq!(stars_to_usd(stars), usd);
        }
    }
}
