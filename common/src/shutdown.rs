//! A multi-producer, multi-consumer graceful shutdown signal.
//!
//! Grounded in the teacher's `common::shutdown::ShutdownChannel`: a
//! [`tokio::sync::Semaphore`] with zero permits, closed (never acquired) to
//! broadcast shutdown. Unlike [`tokio::sync::broadcast`], a consumer that
//! subscribes *after* the signal was sent still observes it immediately,
//! which matters here since services are wired up in an arbitrary order at
//! startup (spec §2a graceful shutdown).

use std::sync::Arc;

use tokio::sync::Semaphore;

#[derive(Clone, Debug)]
pub struct ShutdownChannel {
    inner: Arc<Semaphore>,
}

impl ShutdownChannel {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self { inner: Arc::new(Semaphore::new(0)) }
    }

    /// Broadcast the shutdown signal. Safe to call more than once.
    pub fn send(&self) {
        self.inner.close()
    }

    /// Wait for the shutdown signal. Returns immediately if one was already
    /// sent before this call.
    pub async fn recv(&self) {
        self.inner.acquire().await.map_err(|_| ()).expect_err("semaphore should only close, never grant permits")
    }

    pub fn try_recv(&self) -> bool {
        self.inner.is_closed()
    }
}

impl Default for ShutdownChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use tokio::time;

    use super::*;

    #[test]
    fn multiple_sends_dont_panic() {
        let shutdown = ShutdownChannel::new();
        shutdown.send();
        shutdown.send();
    }

    #[tokio::test(start_paused = true)]
    async fn subscribing_after_send_resolves_immediately() {
        let a = ShutdownChannel::new();
        let b = a.clone();
        a.send();
        time::timeout(Duration::from_nanos(1), b.recv()).await.expect("did not resolve immediately");
        assert!(b.try_recv());
    }
}
