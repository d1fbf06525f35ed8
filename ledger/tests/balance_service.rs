//! Integration tests against a real Postgres instance via `sqlx::test`,
//! which provisions and migrates a throwaway database per test (spec §8
//! testable properties 1-3).

use billing_common::ids::AccountRef;
use billing_ledger::{BalanceService, LedgerStore, NewTransaction, TransactionType};
use rust_decimal_macros::dec;
use sqlx::PgPool;

fn services(pool: PgPool) -> BalanceService {
    BalanceService::new(LedgerStore::from_pool(pool))
}

#[sqlx::test(migrations = "../migrations")]
async fn topup_credits_balance(pool: PgPool) {
    let balance = services(pool);
    let account_ref = AccountRef::ExternalChatId(42);

    let tx = balance
        .credit(&account_ref, dec!(10.00), NewTransaction::new(TransactionType::Topup, "test"), "topup-1")
        .await
        .unwrap();

    assert_eq!(tx.balance_before, dec!(0));
    assert_eq!(tx.balance_after, dec!(10.00000000));
    assert_eq!(balance.get_balance(&account_ref).await.unwrap(), dec!(10.00000000));
}

#[sqlx::test(migrations = "../migrations")]
async fn same_idempotency_key_applies_exactly_once(pool: PgPool) {
    let balance = services(pool);
    let account_ref = AccountRef::ExternalChatId(7);

    let first = balance
        .credit(&account_ref, dec!(5), NewTransaction::new(TransactionType::Topup, "test"), "dup-key")
        .await
        .unwrap();
    let second = balance
        .credit(&account_ref, dec!(5), NewTransaction::new(TransactionType::Topup, "test"), "dup-key")
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(balance.get_balance(&account_ref).await.unwrap(), dec!(5));
}

#[sqlx::test(migrations = "../migrations")]
async fn debit_below_zero_is_rejected_and_balance_unchanged(pool: PgPool) {
    let balance = services(pool);
    let account_ref = AccountRef::ExternalChatId(9);

    balance
        .credit(&account_ref, dec!(1.00), NewTransaction::new(TransactionType::Topup, "test"), "seed")
        .await
        .unwrap();

    let err = balance
        .debit(&account_ref, dec!(2.00), NewTransaction::new(TransactionType::Usage, "test"), "overdraw")
        .await
        .unwrap_err();

    assert!(matches!(err, billing_common::error::LedgerError::InsufficientBalance { .. }));
    assert_eq!(balance.get_balance(&account_ref).await.unwrap(), dec!(1.00));
}

#[sqlx::test(migrations = "../migrations")]
async fn concurrent_debits_serialize_and_never_go_negative(pool: PgPool) {
    let balance = services(pool);
    let account_ref = AccountRef::ExternalChatId(11);
    balance
        .credit(&account_ref, dec!(10.00), NewTransaction::new(TransactionType::Topup, "test"), "seed")
        .await
        .unwrap();

    // Ten concurrent 2.00 debits against a 10.00 balance: exactly five
    // should succeed and five should see InsufficientBalance, regardless of
    // interleaving (spec §8 property 2 "non-negative under concurrency").
    let mut handles = Vec::new();
    for i in 0..10 {
        let balance = balance.clone();
        let account_ref = account_ref.clone();
        handles.push(tokio::spawn(async move {
            balance
                .debit(
                    &account_ref,
                    dec!(2.00),
                    NewTransaction::new(TransactionType::Usage, "test"),
                    &format!("debit-{i}"),
                )
                .await
        }));
    }

    let mut ok_count = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            ok_count += 1;
        }
    }

    assert_eq!(ok_count, 5);
    assert_eq!(balance.get_balance(&account_ref).await.unwrap(), dec!(0.00));
}
