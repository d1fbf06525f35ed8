//! `billing-notify`: the out-of-band notification hook (C8).
//!
//! Grounded in spec §4.8: `notify_success`/`notify_failure`/`notify_low_balance`
//! are fire-and-forget and never participate in the balance-mutation
//! transaction. The [`NotificationSink`] trait is the expansion called for in
//! §4.8 -- the framing layer substitutes a real chat-bot/webhook sink in
//! place of [`LoggingSink`]; dispatch goes through the shared
//! `billing_common::resilient` wrapper so a slow sink can't block the caller
//! past its own deadline.

use async_trait::async_trait;
use billing_common::ids::AccountRef;
use billing_common::resilient::call_with_retries;
use rust_decimal::Decimal;
use tracing::warn;

/// One outbound notification. Kept as a flat enum rather than three trait
/// methods so a sink implementation has a single match arm to extend instead
/// of three methods to keep in sync.
#[derive(Debug, Clone)]
pub enum Notification {
    Success { account_ref: AccountRef, amount_usd: Decimal, new_balance_usd: Decimal },
    Failure { account_ref: AccountRef, reason: String },
    LowBalance { account_ref: AccountRef, current_balance_usd: Decimal },
}

/// A destination for notifications. The default [`LoggingSink`] just logs;
/// the framing layer is expected to substitute a real chat-bot or webhook
/// sink here.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, notification: Notification) -> anyhow::Result<()>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingSink;

#[async_trait]
impl NotificationSink for LoggingSink {
    async fn send(&self, notification: Notification) -> anyhow::Result<()> {
        tracing::info!(?notification, "notification (logging sink)");
        Ok(())
    }
}

/// The public contract callers use (spec §4.8). Every method swallows its
/// own failure: a notification is advisory, never load-bearing for the
/// balance mutation it follows.
pub struct NotificationHook<S: NotificationSink> {
    sink: S,
}

impl<S: NotificationSink> NotificationHook<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    async fn dispatch(&self, notification: Notification) {
        let policy = billing_common::backoff::BackoffPolicy {
            max_attempts: 2,
            ..billing_common::backoff::BackoffPolicy::CARD_PROVIDER
        };
        let result = call_with_retries(policy, |_: &anyhow::Error| true, || self.sink.send(notification.clone())).await;
        if let Err(e) = result {
            warn!(error = %e, "notification delivery failed, swallowing");
        }
    }

    pub async fn notify_success(&self, account_ref: &AccountRef, amount_usd: Decimal, new_balance_usd: Decimal) {
        self.dispatch(Notification::Success {
            account_ref: account_ref.clone(),
            amount_usd,
            new_balance_usd,
        })
        .await;
    }

    pub async fn notify_failure(&self, account_ref: &AccountRef, reason: impl Into<String>) {
        self.dispatch(Notification::Failure { account_ref: account_ref.clone(), reason: reason.into() }).await;
    }

    pub async fn notify_low_balance(&self, account_ref: &AccountRef, current_balance_usd: Decimal) {
        self.dispatch(Notification::LowBalance { account_ref: account_ref.clone(), current_balance_usd }).await;
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[derive(Clone, Default)]
    struct CountingSink(Arc<AtomicUsize>);

    #[async_trait]
    impl NotificationSink for CountingSink {
        async fn send(&self, _notification: Notification) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct FailingSink;

    #[async_trait]
    impl NotificationSink for FailingSink {
        async fn send(&self, _notification: Notification) -> anyhow::Result<()> {
            anyhow::bail!("sink unavailable")
        }
    }

    #[tokio::test]
    async fn success_notification_reaches_sink() {
        let counter = Arc::new(AtomicUsize::new(0));
        let hook = NotificationHook::new(CountingSink(counter.clone()));
        hook.notify_success(&AccountRef::ExternalChatId(1), Decimal::ONE, Decimal::ONE).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_sink_never_panics_or_propagates() {
        let hook = NotificationHook::new(FailingSink);
        hook.notify_failure(&AccountRef::ExternalChatId(1), "balance mutation failed").await;
        hook.notify_low_balance(&AccountRef::ExternalChatId(1), Decimal::ZERO).await;
    }
}
