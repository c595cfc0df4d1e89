//! Refresh token manager
//!
//! Generates 256-bit random refresh secrets and persists their SHA-256
//! digest. The plaintext secret is returned once, to the caller that issued
//! it, and never stored.

use base64::Engine;
use chrono::Duration;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tessera_core::config::MAX_TOKEN_TTL_SECS;
use tessera_core::models::RefreshToken;
use tessera_core::store::{RefreshTokenStore, RevokeOutcome, StoreError};
use thiserror::Error;
use uuid::Uuid;

/// Bytes of entropy in a refresh secret
pub const REFRESH_TOKEN_BYTES: usize = 32;

/// Refresh token errors
#[derive(Debug, Error)]
pub enum RefreshTokenError {
    #[error("Refresh token not found")]
    NotFound,

    #[error("Refresh token store error: {0}")]
    Store(String),

    #[error("Refresh token lifetime out of range: {0}s")]
    InvalidTtl(u64),
}

impl From<StoreError> for RefreshTokenError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => Self::NotFound,
            StoreError::Duplicate => Self::Store("duplicate refresh token digest".to_string()),
            StoreError::Backend(msg) => Self::Store(msg),
        }
    }
}

/// Client details recorded with each issued token
#[derive(Debug, Clone, Default)]
pub struct ClientContext {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientContext {
    pub fn new(ip: Option<String>, user_agent: Option<String>) -> Self {
        Self { ip, user_agent }
    }
}

/// Outcome of [`RefreshTokenManager::rotate`]
#[derive(Debug)]
pub enum Rotation {
    /// The old token was revoked and this successor secret was stored
    Rotated(String),
    /// Another caller revoked the old token first; nothing was written
    LostRace,
}

/// Issues, looks up, rotates and revokes refresh tokens
#[derive(Clone)]
pub struct RefreshTokenManager {
    store: Arc<dyn RefreshTokenStore>,
    ttl: Duration,
}

impl RefreshTokenManager {
    /// Build a manager; `ttl_secs` must be between 1 and [`MAX_TOKEN_TTL_SECS`]
    pub fn new(
        store: Arc<dyn RefreshTokenStore>,
        ttl_secs: u64,
    ) -> Result<Self, RefreshTokenError> {
        let ttl = i64::try_from(ttl_secs)
            .ok()
            .filter(|_| (1..=MAX_TOKEN_TTL_SECS).contains(&ttl_secs))
            .and_then(Duration::try_seconds)
            .ok_or(RefreshTokenError::InvalidTtl(ttl_secs))?;

        Ok(Self { store, ttl })
    }

    /// Generate a random URL-safe refresh secret
    pub fn generate_token() -> String {
        let mut rng = rand::thread_rng();
        let token_bytes: [u8; REFRESH_TOKEN_BYTES] = rng.gen();
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(token_bytes)
    }

    /// Lowercase hex SHA-256 of a refresh secret
    pub fn hash_token(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn new_record(&self, account_id: Uuid, client: &ClientContext) -> (String, RefreshToken) {
        let secret = Self::generate_token();
        let record = RefreshToken::new(
            account_id,
            Self::hash_token(&secret),
            self.ttl,
            client.ip.clone(),
            client.user_agent.clone(),
        );
        (secret, record)
    }

    /// Create and persist a token for an account, returning its plaintext secret
    pub async fn issue_and_store(
        &self,
        account_id: Uuid,
        client: &ClientContext,
    ) -> Result<String, RefreshTokenError> {
        let (secret, record) = self.new_record(account_id, client);
        self.store.create_token(&record).await?;

        tracing::debug!(account_id = %account_id, token_id = %record.id, "Refresh token issued");
        Ok(secret)
    }

    /// Find the record for a plaintext secret
    pub async fn lookup(&self, token: &str) -> Result<RefreshToken, RefreshTokenError> {
        Ok(self.store.get_token_by_hash(&Self::hash_token(token)).await?)
    }

    /// Revoke `old` and issue its successor in one atomic store operation
    ///
    /// If `old` was revoked by someone else in the meantime, nothing is
    /// written and [`Rotation::LostRace`] is returned.
    pub async fn rotate(
        &self,
        old: &RefreshToken,
        client: &ClientContext,
    ) -> Result<Rotation, RefreshTokenError> {
        let (secret, successor) = self.new_record(old.account_id, client);

        match self.store.rotate_token(old.id, &successor).await? {
            RevokeOutcome::Revoked => {
                tracing::debug!(
                    account_id = %old.account_id,
                    old_token_id = %old.id,
                    token_id = %successor.id,
                    "Refresh token rotated"
                );
                Ok(Rotation::Rotated(secret))
            }
            RevokeOutcome::AlreadyRevoked => Ok(Rotation::LostRace),
        }
    }

    /// Revoke a single token
    pub async fn revoke_one(
        &self,
        token: &RefreshToken,
    ) -> Result<RevokeOutcome, RefreshTokenError> {
        Ok(self.store.revoke_token(token.id).await?)
    }

    /// Revoke every active token of an account; zero is success
    pub async fn revoke_all_for_account(&self, account_id: Uuid) -> Result<u64, RefreshTokenError> {
        Ok(self.store.revoke_tokens_for_account(account_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_store::InMemoryRefreshTokenStore;

    fn manager() -> (Arc<InMemoryRefreshTokenStore>, RefreshTokenManager) {
        let store = Arc::new(InMemoryRefreshTokenStore::new());
        let manager = RefreshTokenManager::new(store.clone(), 3600).unwrap();
        (store, manager)
    }

    #[test]
    fn test_generated_tokens_are_256_bit_and_distinct() {
        let a = RefreshTokenManager::generate_token();
        let b = RefreshTokenManager::generate_token();

        let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(&a)
            .unwrap();
        assert_eq!(decoded.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_is_sha256_hex() {
        // echo -n "abc" | sha256sum
        assert_eq!(
            RefreshTokenManager::hash_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_issue_stores_digest_only() {
        let (store, manager) = manager();
        let account_id = Uuid::new_v4();
        let client = ClientContext::new(Some("10.1.2.3".to_string()), Some(String::new()));

        let secret = manager.issue_and_store(account_id, &client).await.unwrap();

        let records = store.tokens_for_account(account_id).await;
        assert_eq!(records.len(), 1);
        assert_ne!(records[0].token_hash, secret);
        assert_eq!(records[0].token_hash, RefreshTokenManager::hash_token(&secret));
        assert_eq!(records[0].client_ip.as_deref(), Some("10.1.2.3"));
        assert_eq!(records[0].user_agent, None);

        let found = manager.lookup(&secret).await.unwrap();
        assert_eq!(found.id, records[0].id);
    }

    #[tokio::test]
    async fn test_lookup_unknown_is_not_found() {
        let (_, manager) = manager();
        assert!(matches!(
            manager.lookup("no-such-token").await,
            Err(RefreshTokenError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_rotate_is_single_use() {
        let (_, manager) = manager();
        let client = ClientContext::default();
        let secret = manager.issue_and_store(Uuid::new_v4(), &client).await.unwrap();
        let record = manager.lookup(&secret).await.unwrap();

        let successor = match manager.rotate(&record, &client).await.unwrap() {
            Rotation::Rotated(secret) => secret,
            Rotation::LostRace => panic!("first rotation must win"),
        };
        assert!(manager.lookup(&successor).await.unwrap().revoked_at.is_none());
        assert!(manager.lookup(&secret).await.unwrap().revoked_at.is_some());

        assert!(matches!(
            manager.rotate(&record, &client).await.unwrap(),
            Rotation::LostRace
        ));
    }

    #[tokio::test]
    async fn test_revoke_one_is_conditional() {
        let (_, manager) = manager();
        let client = ClientContext::default();
        let secret = manager.issue_and_store(Uuid::new_v4(), &client).await.unwrap();
        let record = manager.lookup(&secret).await.unwrap();

        assert!(matches!(
            manager.revoke_one(&record).await.unwrap(),
            RevokeOutcome::Revoked
        ));
        assert!(matches!(
            manager.revoke_one(&record).await.unwrap(),
            RevokeOutcome::AlreadyRevoked
        ));

        let revoked = manager.lookup(&secret).await.unwrap();
        assert!(revoked.revoked_at.is_some());
        assert!(matches!(
            manager.rotate(&revoked, &client).await.unwrap(),
            Rotation::LostRace
        ));
    }

    #[test]
    fn test_rejects_out_of_range_ttl() {
        let store = Arc::new(InMemoryRefreshTokenStore::new());
        for ttl in [0, MAX_TOKEN_TTL_SECS + 1, 10_000_000_000_000_000, u64::MAX] {
            assert!(matches!(
                RefreshTokenManager::new(store.clone(), ttl),
                Err(RefreshTokenError::InvalidTtl(t)) if t == ttl
            ));
        }
    }

    #[tokio::test]
    async fn test_issued_token_expires_after_configured_ttl() {
        let store = Arc::new(InMemoryRefreshTokenStore::new());
        let manager = RefreshTokenManager::new(store, MAX_TOKEN_TTL_SECS).unwrap();
        let secret = manager
            .issue_and_store(Uuid::new_v4(), &ClientContext::default())
            .await
            .unwrap();
        let record = manager.lookup(&secret).await.unwrap();

        assert!(!record.is_expired_at(chrono::Utc::now()));
        let lifetime = record.expires_at - record.created_at;
        assert_eq!(lifetime.num_seconds(), MAX_TOKEN_TTL_SECS as i64);
    }

    #[tokio::test]
    async fn test_revoke_all_for_account() {
        let (_, manager) = manager();
        let account_id = Uuid::new_v4();
        let client = ClientContext::default();
        for _ in 0..3 {
            manager.issue_and_store(account_id, &client).await.unwrap();
        }

        assert_eq!(manager.revoke_all_for_account(account_id).await.unwrap(), 3);
        assert_eq!(manager.revoke_all_for_account(account_id).await.unwrap(), 0);
    }
}
