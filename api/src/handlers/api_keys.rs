//! `POST/GET /api_keys`, `DELETE /api_keys/{prefix}` (spec §4.7, §6).

use axum::extract::{Path, State};
use axum::response::Json;
use billing_common::error::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::auth::AuthenticatedAccount;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct CreateApiKeyRequest {
    pub label: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateApiKeyResponse {
    /// The raw `<scheme>_<prefix>_<secret>` key. Returned exactly once; it
    /// is never retrievable again (spec §4.7).
    pub api_key: String,
    pub key_prefix: String,
    pub label: String,
    pub scopes: Vec<String>,
}

/// `POST /api_keys`.
#[instrument(skip_all, name = "(create-api-key)")]
pub async fn create_api_key(
    State(state): State<SharedState>,
    account: AuthenticatedAccount,
    Json(req): Json<CreateApiKeyRequest>,
) -> Result<Json<CreateApiKeyResponse>, CoreError> {
    let (raw_key, row) = state
        .credentials
        .create(account.account_id, req.label, req.scopes)
        .await
        .map_err(CoreError::Auth)?;
    Ok(Json(CreateApiKeyResponse {
        api_key: raw_key,
        key_prefix: row.key_prefix,
        label: row.label,
        scopes: row.scopes,
    }))
}

#[derive(Debug, Serialize)]
pub struct ApiKeySummary {
    pub key_prefix: String,
    pub label: String,
    pub scopes: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// `GET /api_keys`. Never includes `key_hash` or the raw secret.
#[instrument(skip_all, name = "(list-api-keys)")]
pub async fn list_api_keys(
    State(state): State<SharedState>,
    account: AuthenticatedAccount,
) -> Result<Json<Vec<ApiKeySummary>>, CoreError> {
    let rows = state.credentials.list(account.account_id).await.map_err(CoreError::Auth)?;
    Ok(Json(
        rows.into_iter()
            .map(|row| ApiKeySummary {
                key_prefix: row.key_prefix,
                label: row.label,
                scopes: row.scopes,
                is_active: row.is_active,
                created_at: row.created_at,
                last_used_at: row.last_used_at,
            })
            .collect(),
    ))
}

#[derive(Debug, Serialize)]
pub struct RevokeApiKeyResponse {
    pub revoked: bool,
}

/// `DELETE /api_keys/{prefix}`.
#[instrument(skip_all, name = "(revoke-api-key)")]
pub async fn revoke_api_key(
    State(state): State<SharedState>,
    account: AuthenticatedAccount,
    Path(prefix): Path<String>,
) -> Result<Json<RevokeApiKeyResponse>, CoreError> {
    let revoked = state.credentials.revoke(account.account_id, &prefix).await.map_err(CoreError::Auth)?;
    Ok(Json(RevokeApiKeyResponse { revoked }))
}
