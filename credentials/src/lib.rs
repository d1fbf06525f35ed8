//! `billing-credentials`: API key issuance, verification, revocation, and
//! the anti-abuse rate limiter (C7).
//!
//! Grounded in the teacher's prefix-indexed credential lookups (the same
//! shape as `common`'s node-client auth tables: a public prefix for O(1)
//! lookup, a hashed secret for verification) and the corpus's
//! per-IP-and-per-key failure tracking in `original_source/auth.py` (spec
//! §2b supplement).

mod model;
mod rate_limit;
mod service;
mod store;

pub use model::{ApiKey, NewApiKey};
pub use rate_limit::RateLimiter;
pub use service::CredentialService;
pub use store::CredentialStore;
