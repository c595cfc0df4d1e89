//! In-process stores
//!
//! Backed by `tokio::sync::RwLock`-guarded maps. Every conditional update
//! runs under a single write guard, which gives the same single-winner
//! behavior as the PostgreSQL conditional `UPDATE`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use tessera_core::models::{Account, RefreshToken};
use tessera_core::store::{
    AccountStore, RefreshTokenStore, RevokeOutcome, StoreError, StoreResult,
};

#[derive(Default)]
struct AccountTable {
    by_id: HashMap<Uuid, Account>,
    id_by_email: HashMap<String, Uuid>,
}

/// Account store held in process memory
#[derive(Default)]
pub struct InMemoryAccountStore {
    inner: RwLock<AccountTable>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored accounts
    pub async fn len(&self) -> usize {
        self.inner.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn create_account(&self, account: &Account) -> StoreResult<()> {
        let mut table = self.inner.write().await;
        if table.id_by_email.contains_key(&account.email) || table.by_id.contains_key(&account.id)
        {
            return Err(StoreError::Duplicate);
        }
        table.id_by_email.insert(account.email.clone(), account.id);
        table.by_id.insert(account.id, account.clone());
        Ok(())
    }

    async fn get_account_by_email(&self, email: &str) -> StoreResult<Account> {
        let table = self.inner.read().await;
        table
            .id_by_email
            .get(email)
            .and_then(|id| table.by_id.get(id))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_account_by_id(&self, id: Uuid) -> StoreResult<Account> {
        self.inner
            .read()
            .await
            .by_id
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}

#[derive(Default)]
struct TokenTable {
    by_id: HashMap<Uuid, RefreshToken>,
    id_by_hash: HashMap<String, Uuid>,
}

impl TokenTable {
    fn insert(&mut self, token: &RefreshToken) -> StoreResult<()> {
        if self.id_by_hash.contains_key(&token.token_hash) || self.by_id.contains_key(&token.id) {
            return Err(StoreError::Duplicate);
        }
        self.id_by_hash.insert(token.token_hash.clone(), token.id);
        self.by_id.insert(token.id, token.clone());
        Ok(())
    }

    fn revoke_if_active(&mut self, token_id: Uuid, now: DateTime<Utc>) -> RevokeOutcome {
        match self.by_id.get_mut(&token_id) {
            Some(token) if token.revoked_at.is_none() => {
                token.revoked_at = Some(now);
                token.updated_at = now;
                RevokeOutcome::Revoked
            }
            _ => RevokeOutcome::AlreadyRevoked,
        }
    }
}

/// Refresh token store held in process memory
#[derive(Default)]
pub struct InMemoryRefreshTokenStore {
    inner: RwLock<TokenTable>,
}

impl InMemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record belonging to an account
    pub async fn tokens_for_account(&self, account_id: Uuid) -> Vec<RefreshToken> {
        self.inner
            .read()
            .await
            .by_id
            .values()
            .filter(|t| t.account_id == account_id)
            .cloned()
            .collect()
    }

    /// Overwrite a stored record
    ///
    /// Lets tests construct states (expired, revoked) that the public
    /// operations only reach over time.
    pub async fn replace(&self, token: RefreshToken) {
        let mut table = self.inner.write().await;
        if let Some(old) = table.by_id.get(&token.id) {
            let old_hash = old.token_hash.clone();
            table.id_by_hash.remove(&old_hash);
        }
        table.id_by_hash.insert(token.token_hash.clone(), token.id);
        table.by_id.insert(token.id, token);
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshTokenStore {
    async fn create_token(&self, token: &RefreshToken) -> StoreResult<()> {
        self.inner.write().await.insert(token)
    }

    async fn get_token_by_hash(&self, token_hash: &str) -> StoreResult<RefreshToken> {
        let table = self.inner.read().await;
        table
            .id_by_hash
            .get(token_hash)
            .and_then(|id| table.by_id.get(id))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn revoke_token(&self, token_id: Uuid) -> StoreResult<RevokeOutcome> {
        Ok(self
            .inner
            .write()
            .await
            .revoke_if_active(token_id, Utc::now()))
    }

    async fn revoke_tokens_for_account(&self, account_id: Uuid) -> StoreResult<u64> {
        let now = Utc::now();
        let mut table = self.inner.write().await;
        let mut revoked = 0;
        for token in table.by_id.values_mut() {
            if token.account_id == account_id && token.revoked_at.is_none() {
                token.revoked_at = Some(now);
                token.updated_at = now;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn rotate_token(
        &self,
        old_token_id: Uuid,
        successor: &RefreshToken,
    ) -> StoreResult<RevokeOutcome> {
        let mut table = self.inner.write().await;

        // Check the insert first so a failure leaves the old token active
        if table.id_by_hash.contains_key(&successor.token_hash)
            || table.by_id.contains_key(&successor.id)
        {
            return Err(StoreError::Duplicate);
        }

        match table.revoke_if_active(old_token_id, Utc::now()) {
            RevokeOutcome::Revoked => {
                table.insert(successor)?;
                Ok(RevokeOutcome::Revoked)
            }
            RevokeOutcome::AlreadyRevoked => Ok(RevokeOutcome::AlreadyRevoked),
        }
    }

    async fn delete_expired_tokens(&self, before: DateTime<Utc>) -> StoreResult<u64> {
        let mut table = self.inner.write().await;
        let expired: Vec<(Uuid, String)> = table
            .by_id
            .values()
            .filter(|t| t.expires_at < before)
            .map(|t| (t.id, t.token_hash.clone()))
            .collect();

        for (id, hash) in &expired {
            table.by_id.remove(id);
            table.id_by_hash.remove(hash);
        }

        Ok(expired.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    fn token_for(account_id: Uuid, hash: &str) -> RefreshToken {
        RefreshToken::new(
            account_id,
            hash.to_string(),
            Duration::hours(1),
            Some("127.0.0.1".to_string()),
            Some("test-agent".to_string()),
        )
    }

    #[tokio::test]
    async fn test_account_lookup_and_duplicate() {
        let store = InMemoryAccountStore::new();
        let account = Account::new("Alice@Example.com", "hash".to_string());
        assert_ok!(store.create_account(&account).await);

        let by_email = store.get_account_by_email("alice@example.com").await.unwrap();
        assert_eq!(by_email.id, account.id);
        assert_eq!(store.get_account_by_id(account.id).await.unwrap().email, "alice@example.com");

        let dup = Account::new("alice@example.com", "other".to_string());
        assert!(matches!(store.create_account(&dup).await, Err(StoreError::Duplicate)));
        assert_eq!(store.len().await, 1);

        assert_err!(store.get_account_by_email("bob@example.com").await);
    }

    #[tokio::test]
    async fn test_revoke_is_conditional() {
        let store = InMemoryRefreshTokenStore::new();
        let token = token_for(Uuid::new_v4(), "h1");
        store.create_token(&token).await.unwrap();

        assert_eq!(store.revoke_token(token.id).await.unwrap(), RevokeOutcome::Revoked);
        let first_revoked_at = store.get_token_by_hash("h1").await.unwrap().revoked_at;
        assert!(first_revoked_at.is_some());

        assert_eq!(
            store.revoke_token(token.id).await.unwrap(),
            RevokeOutcome::AlreadyRevoked
        );
        // The original revocation time is never overwritten
        assert_eq!(
            store.get_token_by_hash("h1").await.unwrap().revoked_at,
            first_revoked_at
        );

        assert_eq!(
            store.revoke_token(Uuid::new_v4()).await.unwrap(),
            RevokeOutcome::AlreadyRevoked
        );
    }

    #[tokio::test]
    async fn test_revoke_all_counts_only_active() {
        let store = InMemoryRefreshTokenStore::new();
        let account_id = Uuid::new_v4();
        let other_account = Uuid::new_v4();

        for hash in ["a", "b", "c"] {
            store.create_token(&token_for(account_id, hash)).await.unwrap();
        }
        store.create_token(&token_for(other_account, "d")).await.unwrap();

        let b = store.get_token_by_hash("b").await.unwrap();
        store.revoke_token(b.id).await.unwrap();

        assert_eq!(store.revoke_tokens_for_account(account_id).await.unwrap(), 2);
        assert_eq!(store.revoke_tokens_for_account(account_id).await.unwrap(), 0);
        assert!(store.get_token_by_hash("d").await.unwrap().revoked_at.is_none());
    }

    #[tokio::test]
    async fn test_rotation_after_revoke_writes_nothing() {
        let store = InMemoryRefreshTokenStore::new();
        let account_id = Uuid::new_v4();
        let old = token_for(account_id, "old");
        store.create_token(&old).await.unwrap();
        store.revoke_token(old.id).await.unwrap();

        let successor = token_for(account_id, "new");
        assert_eq!(
            store.rotate_token(old.id, &successor).await.unwrap(),
            RevokeOutcome::AlreadyRevoked
        );
        assert!(matches!(
            store.get_token_by_hash("new").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_failed_rotation_leaves_old_token_active() {
        let store = InMemoryRefreshTokenStore::new();
        let account_id = Uuid::new_v4();
        let old = token_for(account_id, "old");
        let existing = token_for(account_id, "taken");
        store.create_token(&old).await.unwrap();
        store.create_token(&existing).await.unwrap();

        let clashing = token_for(account_id, "taken");
        assert!(store.rotate_token(old.id, &clashing).await.is_err());
        assert!(store.get_token_by_hash("old").await.unwrap().revoked_at.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_rotation_has_one_winner() {
        let store = Arc::new(InMemoryRefreshTokenStore::new());
        let account_id = Uuid::new_v4();
        let old = token_for(account_id, "contested");
        store.create_token(&old).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            let old_id = old.id;
            handles.push(tokio::spawn(async move {
                let successor = token_for(account_id, &format!("successor-{i}"));
                store.rotate_token(old_id, &successor).await.unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() == RevokeOutcome::Revoked {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);

        // The old record plus exactly one successor
        assert_eq!(store.tokens_for_account(account_id).await.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_expired_tokens() {
        let store = InMemoryRefreshTokenStore::new();
        let account_id = Uuid::new_v4();

        let live = token_for(account_id, "live");
        let mut stale = token_for(account_id, "stale");
        stale.expires_at = Utc::now() - Duration::hours(2);
        store.create_token(&live).await.unwrap();
        store.create_token(&stale).await.unwrap();

        let removed = store
            .delete_expired_tokens(Utc::now() - Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.get_token_by_hash("stale").await.is_err());
        assert!(store.get_token_by_hash("live").await.is_ok());
    }
}
