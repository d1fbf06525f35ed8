//! `billing-ledger`: the durable ledger store (C1) and the idempotent
//! balance service built on top of it (C2).
//!
//! Grounded in the teacher's `lexe-ln::payments`/`persister` split (a plain
//! data-model module plus a store that owns the actual I/O) and in the
//! corpus's `sqlx`-based ledger services (e.g. `ledger_service.rs`,
//! `postgres_balance_manager.py` in `original_source/`) for the
//! transaction-and-row-lock pattern in §4.1/§4.2.

/// `Account`, `Transaction`, `UsageLog`, `Product`, `AuditLog` row types.
pub mod models;
/// `LedgerStore`: raw durable storage over Postgres.
pub mod store;
/// `BalanceService`: idempotent apply/credit/debit over the store.
pub mod balance;

pub use balance::BalanceService;
pub use models::*;
pub use store::LedgerStore;
