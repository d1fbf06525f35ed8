use billing_common::ids::AccountRef;
use billing_ledger::{BalanceService, LedgerStore, NewTransaction, TransactionType};
use billing_usage::{SettlementOutcome, UsageTracker};
use rust_decimal_macros::dec;
use sqlx::PgPool;

async fn seed_product(pool: &PgPool, id: &str, price: rust_decimal::Decimal) {
    sqlx::query("INSERT INTO products (id, name, base_price_per_unit) VALUES ($1, $1, $2)")
        .bind(id)
        .bind(price)
        .execute(pool)
        .await
        .unwrap();
}

#[sqlx::test(migrations = "../migrations")]
async fn record_usage_debits_price_times_units(pool: PgPool) {
    seed_product(&pool, "gpt-call", dec!(0.002)).await;
    let store = LedgerStore::from_pool(pool);
    let balance = BalanceService::new(store.clone());
    let account_ref = AccountRef::ExternalChatId(1);
    balance
        .credit(&account_ref, dec!(1.00), NewTransaction::new(TransactionType::Topup, "test"), "seed")
        .await
        .unwrap();

    let tracker = UsageTracker::new(store, balance.clone());
    let record = tracker
        .record_usage(&account_ref, "gpt-call", dec!(100), "usage-1", serde_json::json!({}))
        .await
        .unwrap();

    assert_eq!(record.usage_log.cost_usd, dec!(0.20000000));
    assert_eq!(balance.get_balance(&account_ref).await.unwrap(), dec!(0.80000000));
}

#[sqlx::test(migrations = "../migrations")]
async fn record_usage_retry_writes_exactly_one_usage_log(pool: PgPool) {
    seed_product(&pool, "gpt-call", dec!(0.002)).await;
    let store = LedgerStore::from_pool(pool);
    let balance = BalanceService::new(store.clone());
    let account_ref = AccountRef::ExternalChatId(4);
    balance
        .credit(&account_ref, dec!(1.00), NewTransaction::new(TransactionType::Topup, "test"), "seed")
        .await
        .unwrap();

    let tracker = UsageTracker::new(store.clone(), balance.clone());
    let first = tracker
        .record_usage(&account_ref, "gpt-call", dec!(100), "usage-retry", serde_json::json!({}))
        .await
        .unwrap();

    // A client retry of the same request hits the same idempotency key.
    // `balance.debit` returns the already-applied transaction rather than
    // erroring (spec §4.2), so the usage log write must be just as
    // idempotent or the retry double-counts in `GET /usage`.
    let retry = tracker
        .record_usage(&account_ref, "gpt-call", dec!(100), "usage-retry", serde_json::json!({}))
        .await
        .unwrap();
    assert_eq!(retry.transaction.id(), first.transaction.id());
    assert_eq!(retry.usage_log.id, first.usage_log.id);

    let account = balance.resolve_account(&account_ref).await.unwrap();
    let logs = store.list_usage_for_month(account.id(), first.transaction.created_at).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(balance.get_balance(&account_ref).await.unwrap(), dec!(0.80000000));
}

#[sqlx::test(migrations = "../migrations")]
async fn settlement_adjustment_credits_back_overestimate(pool: PgPool) {
    seed_product(&pool, "proxy-call", dec!(1.00)).await;
    let store = LedgerStore::from_pool(pool);
    let balance = BalanceService::new(store.clone());
    let account_ref = AccountRef::ExternalChatId(2);
    balance
        .credit(&account_ref, dec!(10.00), NewTransaction::new(TransactionType::Topup, "test"), "seed")
        .await
        .unwrap();

    let tracker = UsageTracker::new(store, balance.clone());
    let handle = tracker.charge_estimate(&account_ref, "proxy-call", dec!(5), "req-1").await.unwrap();
    assert_eq!(handle.estimate_cost, dec!(5.00000000));
    assert_eq!(balance.get_balance(&account_ref).await.unwrap(), dec!(5.00000000));

    tracker.settle(&handle, SettlementOutcome::Success { actual_cost: dec!(3.00) }).await.unwrap();
    assert_eq!(balance.get_balance(&account_ref).await.unwrap(), dec!(7.00000000));

    // Replaying the settlement is a no-op.
    let replay = tracker.settle(&handle, SettlementOutcome::Success { actual_cost: dec!(3.00) }).await.unwrap();
    assert!(replay.is_none());
    assert_eq!(balance.get_balance(&account_ref).await.unwrap(), dec!(7.00000000));
}

#[sqlx::test(migrations = "../migrations")]
async fn settlement_refunds_full_estimate_on_failure(pool: PgPool) {
    seed_product(&pool, "proxy-call", dec!(2.00)).await;
    let store = LedgerStore::from_pool(pool);
    let balance = BalanceService::new(store.clone());
    let account_ref = AccountRef::ExternalChatId(3);
    balance
        .credit(&account_ref, dec!(10.00), NewTransaction::new(TransactionType::Topup, "test"), "seed")
        .await
        .unwrap();

    let tracker = UsageTracker::new(store, balance.clone());
    let handle = tracker.charge_estimate(&account_ref, "proxy-call", dec!(1), "req-2").await.unwrap();
    tracker.settle(&handle, SettlementOutcome::Failed).await.unwrap();

    assert_eq!(balance.get_balance(&account_ref).await.unwrap(), dec!(10.00000000));
}
