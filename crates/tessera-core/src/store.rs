//! Storage capabilities consumed by the session service
//!
//! Accounts and refresh tokens live behind two independent traits, each
//! backed by its own engine. They share no supertype.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Account, RefreshToken};

/// Store errors
///
/// `NotFound` is an expected outcome; `Backend` is an infrastructure
/// failure and carries the driver message for logging.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record not found")]
    NotFound,

    #[error("Record already exists")]
    Duplicate,

    #[error("Store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result of a conditional revocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeOutcome {
    /// This call moved the token from active to revoked
    Revoked,
    /// The token was already revoked (or is gone); nothing changed
    AlreadyRevoked,
}

/// Account persistence
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Persist a new account; `Duplicate` if the email is taken
    async fn create_account(&self, account: &Account) -> StoreResult<()>;

    /// Look up an account by normalized email
    async fn get_account_by_email(&self, email: &str) -> StoreResult<Account>;

    /// Look up an account by ID
    async fn get_account_by_id(&self, id: Uuid) -> StoreResult<Account>;
}

/// Refresh token persistence
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Persist a new token record
    async fn create_token(&self, token: &RefreshToken) -> StoreResult<()>;

    /// Look up a token by the digest of its secret
    async fn get_token_by_hash(&self, token_hash: &str) -> StoreResult<RefreshToken>;

    /// Revoke one token if, and only if, it is still unrevoked
    ///
    /// The check and the update must be a single atomic step.
    async fn revoke_token(&self, token_id: Uuid) -> StoreResult<RevokeOutcome>;

    /// Revoke every unrevoked token of an account, returning how many changed
    async fn revoke_tokens_for_account(&self, account_id: Uuid) -> StoreResult<u64>;

    /// Atomically revoke `old_token_id` and persist `successor`
    ///
    /// Either both happen or neither does. When the old token is no longer
    /// unrevoked the successor is not written and `AlreadyRevoked` is returned.
    async fn rotate_token(
        &self,
        old_token_id: Uuid,
        successor: &RefreshToken,
    ) -> StoreResult<RevokeOutcome>;

    /// Delete records that expired before `before`, returning how many were removed
    async fn delete_expired_tokens(&self, before: DateTime<Utc>) -> StoreResult<u64>;
}
