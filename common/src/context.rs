//! The explicit per-request context threaded through every service call
//! (spec §9 "per-request context carried implicitly" redesign flag).
//!
//! No service in this core reaches for thread-local or task-local state to
//! recover who's calling, what request this is, or how long it has left to
//! run: callers build one of these at the API boundary and pass it down.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::ids::AccountRef;

/// Context for a single inbound request, constructed once at the API
/// boundary (spec §9).
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub request_id: Uuid,
    /// The authenticated caller, if any (an API key maps to an account; a
    /// webhook has none until the signature is verified).
    pub actor_id: Option<AccountRef>,
    pub account_ref: Option<AccountRef>,
    pub ip: Option<IpAddr>,
    pub user_agent: Option<String>,
    pub opt_in_debug: bool,
    deadline: Instant,
}

impl RequestContext {
    pub fn new(deadline_from_now: Duration) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            actor_id: None,
            account_ref: None,
            ip: None,
            user_agent: None,
            opt_in_debug: false,
            deadline: Instant::now() + deadline_from_now,
        }
    }

    pub fn with_account(mut self, account_ref: AccountRef) -> Self {
        self.actor_id = Some(account_ref.clone());
        self.account_ref = Some(account_ref);
        self
    }

    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.ip = Some(ip);
        self
    }

    pub fn with_user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Time remaining before this request's deadline. Every I/O suspension
    /// point (DB, cache, provider HTTP, notification) should be wrapped with
    /// `tokio::time::timeout(ctx.remaining(), ..)` (spec §5).
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }
}
