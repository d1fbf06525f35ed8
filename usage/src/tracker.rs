use std::collections::BTreeMap;
use std::time::Duration;

use billing_common::error::LedgerError;
use billing_common::ids::AccountRef;
use billing_common::money::price_times_units;
use billing_ledger::{BalanceService, LedgerStore, NewTransaction, Transaction, TransactionType, UsageLog};
use chrono::{DateTime, Utc};
use moka::future::Cache;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value as Json;
use thiserror::Error;
use tracing::instrument;

/// Price cache TTL (spec §4.6 step 1): 5 minutes.
const PRICE_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Error)]
pub enum UsageError {
    #[error("unknown product `{0}`")]
    ProductNotFound(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Lets API handlers propagate a `UsageError` with `?` into the aggregate
/// `CoreError` the same way every other service error does.
impl From<UsageError> for billing_common::error::CoreError {
    fn from(e: UsageError) -> Self {
        match e {
            UsageError::ProductNotFound(id) => {
                billing_common::error::CoreError::Validation(billing_common::error::ValidationError::new(
                    "product_id",
                    format!("unknown product `{id}`"),
                ))
            }
            UsageError::Ledger(e) => billing_common::error::CoreError::Ledger(e),
        }
    }
}

pub struct UsageTracker {
    store: LedgerStore,
    balance: BalanceService,
    price_cache: Cache<String, Decimal>,
}

impl UsageTracker {
    pub fn new(store: LedgerStore, balance: BalanceService) -> Self {
        Self { store, balance, price_cache: Cache::builder().time_to_live(PRICE_CACHE_TTL).build() }
    }

    async fn price_for(&self, product_id: &str) -> Result<Decimal, UsageError> {
        if let Some(price) = self.price_cache.get(product_id).await {
            return Ok(price);
        }
        let product = self
            .store
            .get_product(product_id)
            .await?
            .ok_or_else(|| UsageError::ProductNotFound(product_id.to_string()))?;
        self.price_cache.insert(product_id.to_string(), product.base_price_per_unit).await;
        Ok(product.base_price_per_unit)
    }

    /// Record a flat-cost billable request: resolve price, compute cost,
    /// debit, and log the usage row (spec §4.6 steps 1-4).
    #[instrument(skip(self, metadata))]
    pub async fn record_usage(
        &self,
        account_ref: &AccountRef,
        product_id: &str,
        units: Decimal,
        idempotency_key: &str,
        metadata: Json,
    ) -> Result<UsageRecord, UsageError> {
        let price = self.price_for(product_id).await?;
        let cost = price_times_units(price, units);

        let new_tx = NewTransaction::new(TransactionType::Usage, format!("usage:{product_id}"))
            .with_metadata(metadata.clone());
        let transaction = self.balance.debit(account_ref, cost, new_tx, idempotency_key).await?;

        let account = self.balance.resolve_account(account_ref).await?;
        let usage_log = self
            .store
            .insert_usage_log(account.id(), product_id, units, cost, idempotency_key, metadata)
            .await?;

        Ok(UsageRecord { transaction, usage_log })
    }

    /// Charge an estimate before an upstream call whose real cost is
    /// unknown yet. `request_id` must be supplied by the caller; it seeds
    /// both this charge's and the eventual settlement's idempotency keys so
    /// a retried request never double-charges (spec §4.6 "provisional
    /// charge then settlement").
    #[instrument(skip(self))]
    pub async fn charge_estimate(
        &self,
        account_ref: &AccountRef,
        product_id: &str,
        estimated_units: Decimal,
        request_id: &str,
    ) -> Result<EstimateHandle, UsageError> {
        let price = self.price_for(product_id).await?;
        let estimate_cost = price_times_units(price, estimated_units);
        let idempotency_key = format!("{request_id}:estimate");

        let new_tx = NewTransaction::new(TransactionType::Usage, format!("usage:{product_id}:estimate"));
        self.balance.debit(account_ref, estimate_cost, new_tx, &idempotency_key).await?;

        Ok(EstimateHandle {
            account_ref: account_ref.clone(),
            product_id: product_id.to_string(),
            request_id: request_id.to_string(),
            estimate_cost,
        })
    }

    /// Resolve a [`charge_estimate`] with the actual outcome. Replaying a
    /// settlement for an already-settled `request_id` is a no-op (detected
    /// via the derived settlement idempotency key), so callers may retry
    /// freely (spec §4.6 expansion).
    #[instrument(skip(self))]
    pub async fn settle(
        &self,
        handle: &EstimateHandle,
        outcome: SettlementOutcome,
    ) -> Result<Option<Transaction>, UsageError> {
        let settlement_key = format!("{}:settlement", handle.request_id);
        if self.balance.check_idempotency(&settlement_key).await?.is_some() {
            return Ok(None);
        }

        let tx = match outcome {
            SettlementOutcome::Failed => {
                let new_tx =
                    NewTransaction::new(TransactionType::Refund, format!("usage:{}:refund", handle.product_id));
                self.balance.credit(&handle.account_ref, handle.estimate_cost, new_tx, &settlement_key).await?
            }
            SettlementOutcome::Success { actual_cost } => {
                let delta = billing_common::money::round_usd(handle.estimate_cost - actual_cost);
                let new_tx =
                    NewTransaction::new(TransactionType::Adjustment, format!("usage:{}:adjustment", handle.product_id));
                self.balance.apply(&handle.account_ref, delta, new_tx, &settlement_key).await?
            }
        };
        Ok(Some(tx))
    }

    /// Usage rows and aggregated cost for `account_ref` within the calendar
    /// month containing `month_start` (spec §6 `GET /usage?month=YYYY-MM`).
    pub async fn usage_for_month(
        &self,
        account_ref: &AccountRef,
        month_start: DateTime<Utc>,
    ) -> Result<UsageSummary, UsageError> {
        let account = self.balance.resolve_account(account_ref).await?;
        let logs = self.store.list_usage_for_month(account.id(), month_start).await?;

        let mut by_product: BTreeMap<String, ProductUsage> = BTreeMap::new();
        let mut total_cost = Decimal::ZERO;
        for log in &logs {
            total_cost += log.cost_usd;
            let entry = by_product.entry(log.product_id.clone()).or_insert_with(|| ProductUsage {
                product_id: log.product_id.clone(),
                requests: 0,
                units: Decimal::ZERO,
                cost_usd: Decimal::ZERO,
            });
            entry.requests += 1;
            entry.units += log.units_consumed;
            entry.cost_usd += log.cost_usd;
        }

        Ok(UsageSummary {
            month: month_start.format("%Y-%m").to_string(),
            requests: logs.len(),
            cost_usd: billing_common::money::round_usd(total_cost),
            by_product: by_product.into_values().collect(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct UsageRecord {
    pub transaction: Transaction,
    pub usage_log: UsageLog,
}

/// A provisional charge awaiting settlement (spec §4.6).
#[derive(Debug, Clone)]
pub struct EstimateHandle {
    pub account_ref: AccountRef,
    pub product_id: String,
    pub request_id: String,
    pub estimate_cost: Decimal,
}

#[derive(Debug, Clone, Copy)]
pub enum SettlementOutcome {
    Success { actual_cost: Decimal },
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductUsage {
    pub product_id: String,
    pub requests: u64,
    pub units: Decimal,
    pub cost_usd: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageSummary {
    pub month: String,
    pub requests: usize,
    pub cost_usd: Decimal,
    pub by_product: Vec<ProductUsage>,
}
