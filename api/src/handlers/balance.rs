use axum::extract::State;
use axum::response::Json;
use billing_common::error::CoreError;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::instrument;

use crate::auth::AuthenticatedAccount;
use crate::state::SharedState;

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub balance_usd: Decimal,
}

/// `GET /balance` (spec §6).
#[instrument(skip_all, name = "(get-balance)")]
pub async fn get_balance(
    State(state): State<SharedState>,
    account: AuthenticatedAccount,
) -> Result<Json<BalanceResponse>, CoreError> {
    let balance_usd = state.balance.get_balance(&account.account_ref()).await?;
    Ok(Json(BalanceResponse { balance_usd }))
}
