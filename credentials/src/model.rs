use billing_common::ids::ApiKeyId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: uuid::Uuid,
    pub account_id: uuid::Uuid,
    pub key_prefix: String,
    pub key_hash: String,
    pub label: String,
    pub scopes: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ApiKey {
    pub fn id(&self) -> ApiKeyId {
        ApiKeyId(self.id)
    }
}

#[derive(Debug, Clone)]
pub struct NewApiKey {
    pub account_id: uuid::Uuid,
    pub key_prefix: String,
    pub key_hash: String,
    pub label: String,
    pub scopes: Vec<String>,
}
