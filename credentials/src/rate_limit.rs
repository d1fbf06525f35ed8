//! Anti-abuse rate limiting on authentication failures (spec §4.7 + §2b
//! supplement): a per-IP counter and an independent per-key-prefix counter,
//! either of which tripping is sufficient to reject.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use billing_common::error::AuthError;
use moka::future::Cache;

const WINDOW: Duration = Duration::from_secs(15 * 60);
const MAX_FAILURES: u32 = 5;

/// Best-effort, in-memory only: a process restart resets all counters (spec
/// §4.7 "rate-limit state is best-effort").
#[derive(Clone)]
pub struct RateLimiter {
    by_ip: Cache<IpAddr, Arc<AtomicU32>>,
    by_prefix: Cache<String, Arc<AtomicU32>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            by_ip: Cache::builder().time_to_live(WINDOW).build(),
            by_prefix: Cache::builder().time_to_live(WINDOW).build(),
        }
    }

    pub async fn check(&self, ip: Option<IpAddr>, key_prefix: Option<&str>) -> Result<(), AuthError> {
        if let Some(ip) = ip {
            if let Some(counter) = self.by_ip.get(&ip).await {
                if counter.load(Ordering::Relaxed) >= MAX_FAILURES {
                    return Err(AuthError::RateLimited { retry_after_secs: WINDOW.as_secs() });
                }
            }
        }
        if let Some(prefix) = key_prefix {
            if let Some(counter) = self.by_prefix.get(prefix).await {
                if counter.load(Ordering::Relaxed) >= MAX_FAILURES {
                    return Err(AuthError::RateLimited { retry_after_secs: WINDOW.as_secs() });
                }
            }
        }
        Ok(())
    }

    pub async fn record_failure(&self, ip: Option<IpAddr>, key_prefix: Option<&str>) {
        if let Some(ip) = ip {
            let counter = self.by_ip.get(&ip).await.unwrap_or_default();
            counter.fetch_add(1, Ordering::Relaxed);
            self.by_ip.insert(ip, counter).await;
        }
        if let Some(prefix) = key_prefix {
            let counter = self.by_prefix.get(prefix).await.unwrap_or_default();
            counter.fetch_add(1, Ordering::Relaxed);
            self.by_prefix.insert(prefix.to_string(), counter).await;
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn trips_after_five_failures() {
        let limiter = RateLimiter::new();
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        for _ in 0..4 {
            limiter.record_failure(Some(ip), None).await;
            limiter.check(Some(ip), None).await.unwrap();
        }
        limiter.record_failure(Some(ip), None).await;
        assert!(limiter.check(Some(ip), None).await.is_err());
    }

    #[tokio::test]
    async fn key_prefix_counter_is_independent_of_ip() {
        let limiter = RateLimiter::new();
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        for _ in 0..5 {
            limiter.record_failure(Some(ip), Some("abc123")).await;
        }
        assert!(limiter.check(None, Some("abc123")).await.is_err());
        assert!(limiter.check(Some("10.0.0.2".parse().unwrap()), None).await.is_ok());
    }
}
