//! PostgreSQL stores
//!
//! Accounts and refresh tokens on a shared `sqlx` pool. The conditional
//! revoke (`... AND revoked_at IS NULL`) is what makes refresh rotation
//! single-use under concurrent redemption.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use uuid::Uuid;

use tessera_core::models::{Account, RefreshToken};
use tessera_core::store::{
    AccountStore, RefreshTokenStore, RevokeOutcome, StoreError, StoreResult,
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        id UUID PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        is_verified BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS refresh_tokens (
        id UUID PRIMARY KEY,
        account_id UUID NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        token_hash TEXT NOT NULL UNIQUE,
        expires_at TIMESTAMPTZ NOT NULL,
        revoked_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        client_ip TEXT,
        user_agent TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_refresh_tokens_account_id ON refresh_tokens (account_id)",
    "CREATE INDEX IF NOT EXISTS idx_refresh_tokens_expires_at ON refresh_tokens (expires_at)",
];

/// Open a connection pool
pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(|e| StoreError::Backend(format!("PostgreSQL connection failed: {e}")))
}

/// Create the `accounts` and `refresh_tokens` tables if they do not exist
pub async fn ensure_schema(pool: &PgPool) -> StoreResult<()> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| backend("Failed to apply schema", e))?;
    }
    tracing::debug!("Session store schema is up to date");
    Ok(())
}

fn backend(context: &str, e: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("{context}: {e}"))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

/// Account row from database
#[derive(Debug, FromRow)]
struct AccountRow {
    id: Uuid,
    email: String,
    password_hash: String,
    is_verified: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            is_verified: row.is_verified,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Refresh token row from database
#[derive(Debug, FromRow)]
struct RefreshTokenRow {
    id: Uuid,
    account_id: Uuid,
    token_hash: String,
    expires_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    client_ip: Option<String>,
    user_agent: Option<String>,
}

impl From<RefreshTokenRow> for RefreshToken {
    fn from(row: RefreshTokenRow) -> Self {
        RefreshToken {
            id: row.id,
            account_id: row.account_id,
            token_hash: row.token_hash,
            expires_at: row.expires_at,
            revoked_at: row.revoked_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            client_ip: row.client_ip,
            user_agent: row.user_agent,
        }
    }
}

/// PostgreSQL account store
#[derive(Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn create_account(&self, account: &Account) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, email, password_hash, is_verified, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(account.id)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(account.is_verified)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Duplicate
            } else {
                backend("Failed to create account", e)
            }
        })?;

        Ok(())
    }

    async fn get_account_by_email(&self, email: &str) -> StoreResult<Account> {
        let row: Option<AccountRow> = sqlx::query_as(
            r#"
            SELECT id, email, password_hash, is_verified, created_at, updated_at
            FROM accounts WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| backend("Failed to load account by email", e))?;

        row.map(Into::into).ok_or(StoreError::NotFound)
    }

    async fn get_account_by_id(&self, id: Uuid) -> StoreResult<Account> {
        let row: Option<AccountRow> = sqlx::query_as(
            r#"
            SELECT id, email, password_hash, is_verified, created_at, updated_at
            FROM accounts WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| backend("Failed to load account", e))?;

        row.map(Into::into).ok_or(StoreError::NotFound)
    }
}

/// PostgreSQL refresh token store
#[derive(Clone)]
pub struct PgRefreshTokenStore {
    pool: PgPool,
}

impl PgRefreshTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const INSERT_TOKEN: &str = r#"
    INSERT INTO refresh_tokens (
        id, account_id, token_hash, expires_at, revoked_at,
        created_at, updated_at, client_ip, user_agent
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
"#;

const REVOKE_IF_ACTIVE: &str = "UPDATE refresh_tokens SET revoked_at = $2, updated_at = $2 \
     WHERE id = $1 AND revoked_at IS NULL";

fn bind_token<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    token: &'q RefreshToken,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    query
        .bind(token.id)
        .bind(token.account_id)
        .bind(&token.token_hash)
        .bind(token.expires_at)
        .bind(token.revoked_at)
        .bind(token.created_at)
        .bind(token.updated_at)
        .bind(&token.client_ip)
        .bind(&token.user_agent)
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn create_token(&self, token: &RefreshToken) -> StoreResult<()> {
        bind_token(sqlx::query(INSERT_TOKEN), token)
            .execute(&self.pool)
            .await
            .map_err(|e| backend("Failed to store refresh token", e))?;
        Ok(())
    }

    async fn get_token_by_hash(&self, token_hash: &str) -> StoreResult<RefreshToken> {
        let row: Option<RefreshTokenRow> = sqlx::query_as(
            r#"
            SELECT id, account_id, token_hash, expires_at, revoked_at,
                   created_at, updated_at, client_ip, user_agent
            FROM refresh_tokens WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| backend("Failed to load refresh token", e))?;

        row.map(Into::into).ok_or(StoreError::NotFound)
    }

    async fn revoke_token(&self, token_id: Uuid) -> StoreResult<RevokeOutcome> {
        let result = sqlx::query(REVOKE_IF_ACTIVE)
            .bind(token_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(|e| backend("Failed to revoke refresh token", e))?;

        if result.rows_affected() == 0 {
            Ok(RevokeOutcome::AlreadyRevoked)
        } else {
            Ok(RevokeOutcome::Revoked)
        }
    }

    async fn revoke_tokens_for_account(&self, account_id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $2, updated_at = $2 \
             WHERE account_id = $1 AND revoked_at IS NULL",
        )
        .bind(account_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| backend("Failed to revoke account tokens", e))?;

        Ok(result.rows_affected())
    }

    async fn rotate_token(
        &self,
        old_token_id: Uuid,
        successor: &RefreshToken,
    ) -> StoreResult<RevokeOutcome> {
        // Dropping `tx` before commit rolls back, so a cancelled rotation
        // leaves the old token untouched.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| backend("Failed to begin rotation", e))?;

        let revoked = sqlx::query(REVOKE_IF_ACTIVE)
            .bind(old_token_id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(|e| backend("Failed to revoke rotated token", e))?;

        if revoked.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| backend("Failed to roll back rotation", e))?;
            return Ok(RevokeOutcome::AlreadyRevoked);
        }

        bind_token(sqlx::query(INSERT_TOKEN), successor)
            .execute(&mut *tx)
            .await
            .map_err(|e| backend("Failed to store successor token", e))?;

        tx.commit()
            .await
            .map_err(|e| backend("Failed to commit rotation", e))?;

        Ok(RevokeOutcome::Revoked)
    }

    async fn delete_expired_tokens(&self, before: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < $1")
            .bind(before)
            .execute(&self.pool)
            .await
            .map_err(|e| backend("Failed to purge expired tokens", e))?;

        Ok(result.rows_affected())
    }
}
