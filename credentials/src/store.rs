use billing_common::error::LedgerError;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::model::{ApiKey, NewApiKey};

#[derive(Clone)]
pub struct CredentialStore {
    pool: PgPool,
}

impl CredentialStore {
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, new_key: NewApiKey) -> Result<ApiKey, LedgerError> {
        sqlx::query_as::<_, ApiKey>(
            "INSERT INTO api_keys (id, account_id, key_prefix, key_hash, label, scopes)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(new_key.account_id)
        .bind(&new_key.key_prefix)
        .bind(&new_key.key_hash)
        .bind(&new_key.label)
        .bind(&new_key.scopes)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }

    pub async fn get_active_by_prefix(&self, prefix: &str) -> Result<Option<ApiKey>, LedgerError> {
        sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE key_prefix = $1 AND is_active")
            .bind(prefix)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)
    }

    pub async fn list_by_account(&self, account_id: Uuid) -> Result<Vec<ApiKey>, LedgerError> {
        sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE account_id = $1 ORDER BY created_at ASC")
            .bind(account_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)
    }

    pub async fn revoke(&self, account_id: Uuid, prefix: &str) -> Result<bool, LedgerError> {
        let result = sqlx::query(
            "UPDATE api_keys SET is_active = false WHERE account_id = $1 AND key_prefix = $2 AND is_active",
        )
        .bind(account_id)
        .bind(prefix)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn touch_last_used(&self, prefix: &str) -> Result<(), LedgerError> {
        sqlx::query("UPDATE api_keys SET last_used_at = now() WHERE key_prefix = $1")
            .bind(prefix)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

fn db_err(e: sqlx::Error) -> LedgerError {
    warn!(error = %e, "credential store database error");
    LedgerError::Database(e.to_string())
}
