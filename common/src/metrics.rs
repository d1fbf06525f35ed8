//! A narrow metrics interface. Prometheus metric *names* are explicitly out
//! of scope (spec §1); this trait lets the orchestrator and credential
//! service record the handful of counters spec §4.3/§4.7 call for without
//! committing this core to a concrete exporter. The framing layer supplies
//! a real implementation; [`NoopMetrics`] logs at debug and is the default.

use tracing::debug;

pub trait Metrics: Send + Sync {
    fn record_provider_call(&self, provider: &'static str, outcome: &'static str);
    fn record_webhook(&self, provider: &'static str, event_type: &str, outcome: &'static str);
    fn record_auth_failure(&self, reason: &'static str);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn record_provider_call(&self, provider: &'static str, outcome: &'static str) {
        debug!(provider, outcome, "metric: provider_call");
    }

    fn record_webhook(&self, provider: &'static str, event_type: &str, outcome: &'static str) {
        debug!(provider, event_type, outcome, "metric: webhook");
    }

    fn record_auth_failure(&self, reason: &'static str) {
        debug!(reason, "metric: auth_failure");
    }
}
