//! Route table for the HTTP surface in spec §6, plus the shared
//! tracing/CORS/timeout middleware stack (spec §2a, grounded in the
//! teacher's `tower`/`tower-http` layering).

use std::time::Duration;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{admin, api_keys, balance, payment, usage, webhooks};
use crate::state::SharedState;

/// Upper bound on how long any single request may occupy a worker, backing
/// the per-request deadlines documented in spec §5.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/payment/topup", post(payment::create_topup))
        .route("/payment/{id}", get(payment::get_payment_status))
        .route("/webhooks/{provider}", post(webhooks::handle_webhook))
        .route("/balance", get(balance::get_balance))
        .route("/usage", get(usage::get_usage))
        .route("/api_keys", post(api_keys::create_api_key).get(api_keys::list_api_keys))
        .route("/api_keys/{prefix}", delete(api_keys::revoke_api_key))
        .route("/admin/stats", get(admin::get_admin_stats))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
