//! The idempotent balance service (C2): the public contract callers use
//! instead of poking [`LedgerStore`] directly.
//!
//! `BalanceService` resolves an [`AccountRef`] once per call and always
//! checks the idempotency key up front, so a caller that retries a whole
//! request (not just the DB write) still gets the original result back
//! instead of a `DuplicatePayment` error (spec §4.2 "apply is a query, not
//! just a write, the second time around").

use billing_common::error::LedgerError;
use billing_common::ids::AccountRef;
use rust_decimal::Decimal;
use tracing::instrument;

use crate::models::{Account, NewTransaction, Transaction};
use crate::store::LedgerStore;

#[derive(Clone)]
pub struct BalanceService {
    store: LedgerStore,
}

impl BalanceService {
    pub fn new(store: LedgerStore) -> Self {
        Self { store }
    }

    pub async fn resolve_account(&self, account_ref: &AccountRef) -> Result<Account, LedgerError> {
        self.store.resolve_or_create_account(account_ref).await
    }

    pub async fn get_balance(&self, account_ref: &AccountRef) -> Result<Decimal, LedgerError> {
        let account = self.resolve_account(account_ref).await?;
        Ok(account.balance_usd)
    }

    pub async fn check_idempotency(&self, idempotency_key: &str) -> Result<Option<Transaction>, LedgerError> {
        self.store.check_idempotency(idempotency_key).await
    }

    /// Apply a signed `amount_usd` to `account_ref`'s balance under
    /// `idempotency_key`, first checking whether that key has already been
    /// processed. `amount_usd` is positive for credits (TOPUP, REFUND) and
    /// negative for debits (USAGE).
    #[instrument(skip(self, new_tx))]
    pub async fn apply(
        &self,
        account_ref: &AccountRef,
        amount_usd: Decimal,
        new_tx: NewTransaction,
        idempotency_key: &str,
    ) -> Result<Transaction, LedgerError> {
        if let Some(existing) = self.store.check_idempotency(idempotency_key).await? {
            return Ok(existing);
        }
        let account = self.resolve_account(account_ref).await?;
        match self.store.apply_transaction(account.id(), amount_usd, new_tx, idempotency_key).await {
            Ok(tx) => Ok(tx),
            Err(LedgerError::DuplicatePayment(key)) => {
                // Lost a race between our pre-check and the insert; the
                // winner's row is now visible, return it instead of erroring
                // (spec §4.2).
                self.store
                    .check_idempotency(&key)
                    .await?
                    .ok_or(LedgerError::DuplicatePayment(key))
            }
            Err(e) => Err(e),
        }
    }

    /// Convenience wrapper for a positive delta (spec §4.1 TOPUP/REFUND).
    pub async fn credit(
        &self,
        account_ref: &AccountRef,
        amount_usd: Decimal,
        new_tx: NewTransaction,
        idempotency_key: &str,
    ) -> Result<Transaction, LedgerError> {
        debug_assert!(amount_usd >= Decimal::ZERO, "credit amount must be non-negative");
        self.apply(account_ref, amount_usd, new_tx, idempotency_key).await
    }

    /// Convenience wrapper for a negative delta (spec §4.1 USAGE), taking a
    /// non-negative `amount_usd` and negating it internally so callers never
    /// have to remember the sign convention.
    pub async fn debit(
        &self,
        account_ref: &AccountRef,
        amount_usd: Decimal,
        new_tx: NewTransaction,
        idempotency_key: &str,
    ) -> Result<Transaction, LedgerError> {
        debug_assert!(amount_usd >= Decimal::ZERO, "debit amount must be non-negative");
        self.apply(account_ref, -amount_usd, new_tx, idempotency_key).await
    }
}

#[cfg(test)]
mod test {
    // `BalanceService` is exercised end-to-end against a real Postgres
    // instance in `tests/balance_service.rs` (requires `DATABASE_URL`);
    // unit tests here are limited to what doesn't need a database.
    use super::*;

    #[test]
    fn credit_debit_sign_convention_is_symmetric() {
        let credit_amount = Decimal::new(150, 2);
        let debit_amount = Decimal::new(150, 2);
        assert_eq!(credit_amount, -(-debit_amount));
    }
}
