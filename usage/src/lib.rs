//! `billing-usage`: the per-request usage tracker (C6).
//!
//! Grounded in the teacher's `lexe-ln::payments` cost-computation path for
//! the "resolve price, compute cost, debit" shape, generalized to products
//! priced per-unit instead of per-invoice, plus a provisional-charge-then-
//! settlement mode for proxy endpoints where actual cost is only known
//! after an upstream call (spec §4.6).

mod tracker;

pub use tracker::{EstimateHandle, SettlementOutcome, UsageError, UsageRecord, UsageSummary, UsageTracker};
