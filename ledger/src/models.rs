//! Row types for the five ledger tables (spec §3).

use billing_common::ids::{AccountId, ProductId, TransactionId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Account {
    pub id: uuid::Uuid,
    pub external_chat_id: Option<i64>,
    pub email: Option<String>,
    pub balance_usd: Decimal,
    pub opt_in_debug: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn id(&self) -> AccountId {
        AccountId(self.id)
    }
}

/// The kind of balance delta a [`Transaction`] records (spec §3).
#[derive(Copy, Clone, Debug, Eq, PartialEq, strum::Display, strum::EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Topup,
    Usage,
    Refund,
    Adjustment,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Transaction {
    pub id: uuid::Uuid,
    pub account_id: uuid::Uuid,
    #[sqlx(rename = "type")]
    pub type_: String,
    pub amount_usd: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub source: String,
    pub external_id: Option<String>,
    pub idempotency_key: String,
    pub metadata: Json,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn id(&self) -> TransactionId {
        TransactionId(self.id)
    }

    pub fn transaction_type(&self) -> TransactionType {
        self.type_.parse().expect("transactions.type is an application-written enum, never malformed")
    }
}

/// A new transaction to be inserted as part of a balance mutation. Unlike
/// [`Transaction`], this has no `id`/`balance_before`/`balance_after` --
/// those are computed inside the storage transaction (spec §4.1).
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub type_: TransactionType,
    pub source: String,
    pub external_id: Option<String>,
    pub metadata: Json,
}

impl NewTransaction {
    pub fn new(type_: TransactionType, source: impl Into<String>) -> Self {
        Self { type_, source: source.into(), external_id: None, metadata: Json::Object(Default::default()) }
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Json) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct UsageLog {
    pub id: uuid::Uuid,
    pub account_id: uuid::Uuid,
    pub product_id: String,
    pub units_consumed: Decimal,
    pub cost_usd: Decimal,
    pub idempotency_key: String,
    pub metadata: Json,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub base_price_per_unit: Decimal,
}

impl Product {
    pub fn product_id(&self) -> ProductId {
        ProductId(self.id.clone())
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: uuid::Uuid,
    pub account_id: Option<uuid::Uuid>,
    pub action: String,
    pub actor_id: Option<String>,
    pub request_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: Json,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAuditLogEntry {
    pub account_id: Option<AccountId>,
    pub action: String,
    pub actor_id: Option<String>,
    pub request_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: Json,
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn transaction_type_round_trips_through_its_column_string() {
        for t in [TransactionType::Topup, TransactionType::Usage, TransactionType::Refund, TransactionType::Adjustment] {
            let tx = Transaction {
                id: uuid::Uuid::new_v4(),
                account_id: uuid::Uuid::new_v4(),
                type_: t.to_string(),
                amount_usd: Decimal::ZERO,
                balance_before: Decimal::ZERO,
                balance_after: Decimal::ZERO,
                source: "test".to_string(),
                external_id: None,
                idempotency_key: "key".to_string(),
                metadata: Json::Null,
                created_at: Utc::now(),
            };
            assert_eq!(tx.transaction_type(), t);
        }
    }

    #[test]
    fn transaction_type_column_strings_are_uppercase() {
        assert_eq!(TransactionType::Topup.to_string(), "TOPUP");
        assert_eq!(TransactionType::Usage.to_string(), "USAGE");
        assert_eq!(TransactionType::Refund.to_string(), "REFUND");
        assert_eq!(TransactionType::Adjustment.to_string(), "ADJUSTMENT");
        assert_eq!(TransactionType::from_str("TOPUP").unwrap(), TransactionType::Topup);
    }
}
