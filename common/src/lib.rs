//! The `billing-common` crate contains types and functionality shared between
//! every service in the billing core: money, error kinds, request context,
//! configuration, and the reusable retry/backoff primitive.

/// Exponential backoff with jitter for outbound provider calls.
pub mod backoff;
/// Process-wide configuration loaded from the environment.
pub mod config;
/// The explicit per-request context threaded through every service call.
pub mod context;
/// Wire-level error kinds and the `ErrorResponse` envelope.
pub mod error;
/// Strongly-typed identifiers (account, transaction, product) and account refs.
pub mod ids;
/// Fixed-point USD amounts and banker's-rounding helpers.
pub mod money;
/// A narrow, name-agnostic metrics interface (Prometheus naming is framing's job).
pub mod metrics;
/// A generic resilient-call wrapper shared by provider and notification dispatch.
pub mod resilient;
/// A multi-producer, multi-consumer graceful shutdown signal.
pub mod shutdown;
