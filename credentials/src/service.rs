//! The public credential contract (spec §4.7): issue, verify, scope-check,
//! and revoke API keys, backed by a prefix-keyed cache so a hot key never
//! round-trips to Postgres on every request.

use std::net::IpAddr;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use billing_common::error::AuthError;
use billing_common::ids::AccountId;
use billing_ledger::{LedgerStore, NewAuditLogEntry};
use hmac::{Hmac, Mac};
use moka::future::Cache;
use rand::RngCore;
use serde_json::json;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{info, instrument, warn};

use crate::model::{ApiKey, NewApiKey};
use crate::rate_limit::RateLimiter;
use crate::store::CredentialStore;

/// Identifies this credential scheme in the wire format, e.g.
/// `bk_3f2a9c1d8b4e_<43-char-secret>`.
const SCHEME: &str = "bk";
const PREFIX_BYTES: usize = 6; // 12 hex chars
const SECRET_BYTES: usize = 32; // 43 url-safe base64 chars, no padding
const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Clone)]
struct CachedKey {
    account_id: AccountId,
    key_hash: String,
    scopes: Vec<String>,
}

#[derive(Clone)]
pub struct CredentialService {
    store: CredentialStore,
    ledger: LedgerStore,
    server_secret: String,
    cache: Cache<String, CachedKey>,
    pub rate_limiter: RateLimiter,
}

impl CredentialService {
    pub fn new(store: CredentialStore, ledger: LedgerStore, server_secret: impl Into<String>) -> Self {
        Self {
            store,
            ledger,
            server_secret: server_secret.into(),
            cache: Cache::builder().time_to_live(CACHE_TTL).build(),
            rate_limiter: RateLimiter::new(),
        }
    }

    fn hash_secret(&self, secret: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.server_secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(secret.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Generate and persist a new key, returning the raw key exactly once
    /// (spec §4.7 "return the raw key once").
    #[instrument(skip(self))]
    pub async fn create(
        &self,
        account_id: AccountId,
        label: impl Into<String>,
        scopes: Vec<String>,
    ) -> Result<(String, ApiKey), AuthError> {
        let mut prefix_bytes = [0u8; PREFIX_BYTES];
        rand::thread_rng().fill_bytes(&mut prefix_bytes);
        let prefix = hex::encode(prefix_bytes);

        let mut secret_bytes = [0u8; SECRET_BYTES];
        rand::thread_rng().fill_bytes(&mut secret_bytes);
        let secret = URL_SAFE_NO_PAD.encode(secret_bytes);

        let key_hash = self.hash_secret(&secret);
        let new_key = NewApiKey {
            account_id: account_id.0,
            key_prefix: prefix.clone(),
            key_hash: key_hash.clone(),
            label: label.into(),
            scopes: scopes.clone(),
        };
        let api_key = self.store.insert(new_key).await.map_err(|_| AuthError::Unauthorized)?;

        self.cache.insert(prefix.clone(), CachedKey { account_id, key_hash, scopes }).await;

        self.audit(Some(account_id), "KEY_CREATED", Some(&prefix)).await;

        let raw_key = format!("{SCHEME}_{prefix}_{secret}");
        Ok((raw_key, api_key))
    }

    /// Parse and verify `raw_key`, returning `(account_id, scopes)`.
    #[instrument(skip(self, raw_key))]
    pub async fn verify(&self, raw_key: &str, ip: Option<IpAddr>) -> Result<(AccountId, Vec<String>), AuthError> {
        self.rate_limiter.check(ip, None).await?;

        let Some((prefix, secret)) = parse_key(raw_key) else {
            self.rate_limiter.record_failure(ip, None).await;
            return Err(AuthError::Unauthorized);
        };
        self.rate_limiter.check(ip, Some(prefix)).await?;

        let expected_hash = self.hash_secret(secret);

        if let Some(cached) = self.cache.get(prefix).await {
            if cached.key_hash.as_bytes().ct_eq(expected_hash.as_bytes()).unwrap_u8() == 1 {
                return Ok((cached.account_id, cached.scopes));
            }
            self.rate_limiter.record_failure(ip, Some(prefix)).await;
            return Err(AuthError::Unauthorized);
        }

        match self.store.get_active_by_prefix(prefix).await {
            Ok(Some(row)) => {
                if row.key_hash.as_bytes().ct_eq(expected_hash.as_bytes()).unwrap_u8() == 1 {
                    let account_id = AccountId(row.account_id);
                    self.cache
                        .insert(
                            prefix.to_string(),
                            CachedKey { account_id, key_hash: row.key_hash.clone(), scopes: row.scopes.clone() },
                        )
                        .await;
                    let _ = self.store.touch_last_used(prefix).await;
                    Ok((account_id, row.scopes))
                } else {
                    self.rate_limiter.record_failure(ip, Some(prefix)).await;
                    Err(AuthError::Unauthorized)
                }
            }
            Ok(None) => {
                self.rate_limiter.record_failure(ip, Some(prefix)).await;
                Err(AuthError::Unauthorized)
            }
            Err(e) => {
                warn!(error = %e, "credential lookup failed");
                Err(AuthError::Unauthorized)
            }
        }
    }

    /// Reject with 403 if `required` is non-empty and absent from `granted`
    /// (spec §4.7 "separate check").
    pub fn check_scope(granted: &[String], required: &str) -> Result<(), AuthError> {
        if granted.is_empty() || granted.iter().any(|s| s == required) {
            Ok(())
        } else {
            Err(AuthError::Forbidden(required.to_string()))
        }
    }

    #[instrument(skip(self))]
    pub async fn revoke(&self, account_id: AccountId, prefix: &str) -> Result<bool, AuthError> {
        let revoked = self.store.revoke(account_id.0, prefix).await.map_err(|_| AuthError::Unauthorized)?;
        if revoked {
            self.cache.invalidate(prefix).await;
            self.audit(Some(account_id), "KEY_REVOKED", Some(prefix)).await;
        }
        Ok(revoked)
    }

    pub async fn list(&self, account_id: AccountId) -> Result<Vec<ApiKey>, AuthError> {
        self.store.list_by_account(account_id.0).await.map_err(|_| AuthError::Unauthorized)
    }

    async fn audit(&self, account_id: Option<AccountId>, action: &str, prefix: Option<&str>) {
        let entry = NewAuditLogEntry {
            account_id,
            action: action.to_string(),
            actor_id: None,
            request_id: None,
            ip_address: None,
            user_agent: None,
            metadata: json!({ "key_prefix": prefix }),
        };
        if let Err(e) = self.ledger.insert_audit_log(entry).await {
            warn!(error = %e, action, "failed to write credential audit log entry");
        } else {
            info!(action, "credential audit logged");
        }
    }
}

fn parse_key(raw_key: &str) -> Option<(&str, &str)> {
    let rest = raw_key.strip_prefix(SCHEME)?.strip_prefix('_')?;
    rest.split_once('_')
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_well_formed_key() {
        let (prefix, secret) = parse_key("bk_abc123_somesecretvalue").unwrap();
        assert_eq!(prefix, "abc123");
        assert_eq!(secret, "somesecretvalue");
    }

    #[test]
    fn rejects_keys_missing_scheme() {
        assert!(parse_key("abc123_somesecretvalue").is_none());
        assert!(parse_key("bk_onlyprefix").is_none());
    }

    #[test]
    fn scope_check_allows_empty_grant_set() {
        assert!(CredentialService::check_scope(&[], "admin").is_ok());
        assert!(CredentialService::check_scope(&["read".to_string()], "admin").is_err());
        assert!(CredentialService::check_scope(&["admin".to_string()], "admin").is_ok());
    }
}
