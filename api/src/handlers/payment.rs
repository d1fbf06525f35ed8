//! `POST /payment/topup` and `GET /payment/{id}` (spec §6).

use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::response::Json;
use billing_common::error::{CoreError, ValidationError};
use billing_providers::{CheckoutRequest, ProviderName};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::instrument;
use uuid::Uuid;

use crate::auth::AuthenticatedAccount;
use crate::state::SharedState;

/// `amount_usd` must fall in this inclusive range (spec §6).
const MIN_TOPUP_USD: Decimal = dec!(5);
const MAX_TOPUP_USD: Decimal = dec!(1000);

#[derive(Debug, Deserialize)]
pub struct TopupRequest {
    pub amount_usd: Decimal,
    pub method: String,
    pub success_url: Option<String>,
    pub cancel_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TopupResponse {
    pub payment_id: String,
    pub status: String,
    pub checkout_url: Option<String>,
    pub invoice_blob: Option<JsonValue>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// `POST /payment/topup`.
#[instrument(skip_all, name = "(create-topup)")]
pub async fn create_topup(
    State(state): State<SharedState>,
    account: AuthenticatedAccount,
    Json(req): Json<TopupRequest>,
) -> Result<Json<TopupResponse>, CoreError> {
    if req.amount_usd < MIN_TOPUP_USD || req.amount_usd > MAX_TOPUP_USD {
        return Err(CoreError::Validation(ValidationError::new(
            "amount_usd",
            format!("must be between {MIN_TOPUP_USD} and {MAX_TOPUP_USD}"),
        )));
    }
    let method = ProviderName::from_str(&req.method)
        .map_err(|_| ValidationError::new("method", format!("unknown payment method `{}`", req.method)))?;

    let checkout = CheckoutRequest {
        account_ref: account.account_ref(),
        amount_usd: req.amount_usd,
        idempotency_key: Uuid::new_v4().to_string(),
        success_url: req.success_url.unwrap_or_else(|| state.config.webapp_url.clone()),
        cancel_url: req.cancel_url.unwrap_or_else(|| state.config.frontend_url.clone()),
    };

    let result = state.providers.create_payment(method, checkout, state.metrics.as_ref()).await?;
    Ok(Json(TopupResponse {
        payment_id: result.payment_id,
        status: result.status,
        checkout_url: result.checkout_url,
        invoice_blob: result.invoice_blob,
        expires_at: result.expires_at,
    }))
}

#[derive(Debug, Deserialize)]
pub struct PaymentStatusQuery {
    /// Which provider issued `id`. Optional: both adapters are tried in
    /// order when omitted, since payment ids are provider-namespaced and a
    /// status probe has no other way to disambiguate them.
    pub provider: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PaymentStatusResponse {
    pub payment_id: String,
    pub status: String,
}

/// `GET /payment/{id}`.
#[instrument(skip_all, name = "(get-payment-status)")]
pub async fn get_payment_status(
    State(state): State<SharedState>,
    _account: AuthenticatedAccount,
    Path(payment_id): Path<String>,
    Query(query): Query<PaymentStatusQuery>,
) -> Result<Json<PaymentStatusResponse>, CoreError> {
    let candidates: Vec<ProviderName> = match query.provider.as_deref() {
        Some(raw) => vec![ProviderName::from_str(raw)
            .map_err(|_| ValidationError::new("provider", format!("unknown provider `{raw}`")))?],
        None => vec![ProviderName::Card, ProviderName::Wallet],
    };

    let mut last_err = None;
    for provider in candidates {
        match state.providers.get(provider).get_payment_status(&payment_id).await {
            Ok(status) => return Ok(Json(PaymentStatusResponse { payment_id, status })),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.map(CoreError::Provider).unwrap_or(CoreError::NotFound))
}
