//! A generic resilient-call wrapper (spec §2b "`reliapi`-style"): the same
//! [`BackoffPolicy`] used by the card provider's REST client, lifted to
//! apply to *any* fallible async call, not just HTTP requests. The wallet
//! adapter's occasional outbound calls and the notification hook's sink
//! dispatch both go through this instead of each rolling their own loop
//! (spec §9 "scripted retry loops" redesign flag).

use std::future::Future;

use tracing::debug;

use crate::backoff::BackoffPolicy;

/// Retry `f` under `policy`, stopping as soon as `is_retryable` returns
/// `false` for the latest error or attempts are exhausted. Returns the last
/// error if every attempt fails.
pub async fn call_with_retries<F, Fut, T, E>(policy: BackoffPolicy, is_retryable: impl Fn(&E) -> bool, f: F) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut delays = policy.iter();
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if is_retryable(&e) => match delays.next() {
                Some(delay) => {
                    debug!(?delay, "resilient call retrying");
                    tokio::time::sleep(delay).await;
                }
                None => return Err(e),
            },
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test]
    async fn retries_until_success() {
        let policy = BackoffPolicy { base: std::time::Duration::from_millis(1), ..BackoffPolicy::CARD_PROVIDER };
        let attempts = AtomicU32::new(0);
        let result: Result<u32, &str> = call_with_retries(policy, |_| true, || async {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err("not yet")
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result, Ok(2));
    }

    #[tokio::test]
    async fn stops_immediately_on_non_retryable_error() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), &str> = call_with_retries(BackoffPolicy::CARD_PROVIDER, |_| false, || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err("permanent")
        })
        .await;
        assert_eq!(result, Err("permanent"));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
