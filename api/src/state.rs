//! The root application context (spec §9 "global mutable state" redesign
//! flag): one struct holding the registry and every service, constructed
//! once at startup and threaded into every handler via [`axum::extract::State`].
//! No handler reaches for a package-level singleton.

use std::sync::Arc;

use billing_common::config::Config;
use billing_common::metrics::Metrics;
use billing_credentials::CredentialService;
use billing_ledger::{BalanceService, LedgerStore};
use billing_notify::{LoggingSink, NotificationHook};
use billing_providers::ProviderRegistry;
use billing_usage::UsageTracker;

pub struct AppState {
    pub config: Config,
    pub ledger: LedgerStore,
    pub balance: BalanceService,
    pub usage: UsageTracker,
    pub credentials: CredentialService,
    pub providers: ProviderRegistry,
    pub notify: NotificationHook<LoggingSink>,
    pub metrics: Arc<dyn Metrics>,
}

pub type SharedState = Arc<AppState>;
