//! `POST /webhooks/<provider>` (spec §4.3/§4.4/§4.5/§7).
//!
//! Unlike every other handler, a webhook never returns a non-200 status for
//! a verification failure -- that would invite the sender to retry a forged
//! payload. Unknown provider path segments are the one case that is a
//! genuine routing miss, not a payload problem, and those do 404.

use std::collections::HashMap;
use std::str::FromStr;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use billing_providers::{ProviderName, WebhookEvent, WebhookOutcome};
use tracing::{info, instrument};

use crate::state::SharedState;

/// `POST /webhooks/{provider}`.
#[instrument(skip_all, name = "(webhook)", fields(provider = %provider_path))]
pub async fn handle_webhook(
    State(state): State<SharedState>,
    Path(provider_path): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Ok(provider) = ProviderName::from_str(&provider_path) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let mut header_map = HashMap::with_capacity(headers.len());
    for (name, value) in &headers {
        if let Ok(value) = value.to_str() {
            header_map.insert(name.as_str().to_ascii_lowercase(), value.to_string());
        }
    }
    let event = WebhookEvent { raw_body: body.to_vec(), headers: header_map };

    match state.providers.dispatch_webhook(provider, &event, state.metrics.as_ref()).await {
        Ok(WebhookOutcome::Applied(tx)) => {
            info!(transaction_id = %tx.id(), "webhook applied a ledger transaction");
            let account_ref = billing_common::ids::AccountRef::Id(billing_common::ids::AccountId(tx.account_id));
            state.notify.notify_success(&account_ref, tx.amount_usd, tx.balance_after).await;
            Json(serde_json::json!({ "status": "ok" })).into_response()
        }
        Ok(WebhookOutcome::NoOp) => Json(serde_json::json!({ "status": "ok" })).into_response(),
        Ok(WebhookOutcome::NotifyFailure { account_ref, reason }) => {
            state.notify.notify_failure(&account_ref, reason).await;
            Json(serde_json::json!({ "status": "ok" })).into_response()
        }
        Err(e) => e.into_response(),
    }
}
