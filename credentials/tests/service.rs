use billing_common::ids::AccountId;
use billing_credentials::{CredentialService, CredentialStore};
use billing_ledger::LedgerStore;
use sqlx::PgPool;
use uuid::Uuid;

async fn seed_account(pool: &PgPool) -> AccountId {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO accounts (id, external_chat_id) VALUES ($1, $2)")
        .bind(id)
        .bind(id.as_u128() as i64 % 1_000_000)
        .execute(pool)
        .await
        .unwrap();
    AccountId(id)
}

#[sqlx::test(migrations = "../migrations")]
async fn create_then_verify_round_trips(pool: PgPool) {
    let account_id = seed_account(&pool).await;
    let service = CredentialService::new(CredentialStore::from_pool(pool.clone()), LedgerStore::from_pool(pool), "server-secret");

    let (raw_key, _row) = service.create(account_id, "test key", vec!["read".to_string()]).await.unwrap();
    let (verified_account, scopes) = service.verify(&raw_key, None).await.unwrap();

    assert_eq!(verified_account, account_id);
    assert_eq!(scopes, vec!["read".to_string()]);
}

#[sqlx::test(migrations = "../migrations")]
async fn revoked_key_fails_verification(pool: PgPool) {
    let account_id = seed_account(&pool).await;
    let service =
        CredentialService::new(CredentialStore::from_pool(pool.clone()), LedgerStore::from_pool(pool), "server-secret");

    let (raw_key, row) = service.create(account_id, "test key", vec![]).await.unwrap();
    service.revoke(account_id, &row.key_prefix).await.unwrap();

    assert!(service.verify(&raw_key, None).await.is_err());
}

#[sqlx::test(migrations = "../migrations")]
async fn tampered_secret_fails_verification(pool: PgPool) {
    let account_id = seed_account(&pool).await;
    let service =
        CredentialService::new(CredentialStore::from_pool(pool.clone()), LedgerStore::from_pool(pool), "server-secret");

    let (raw_key, _row) = service.create(account_id, "test key", vec![]).await.unwrap();
    let mut tampered = raw_key.clone();
    tampered.push('x');

    assert!(service.verify(&tampered, None).await.is_err());
}
