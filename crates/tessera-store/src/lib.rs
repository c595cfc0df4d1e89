//! Tessera Store - account and refresh token persistence
//!
//! Two backends implement the [`AccountStore`](tessera_core::AccountStore)
//! and [`RefreshTokenStore`](tessera_core::RefreshTokenStore) capabilities:
//!
//! - [`postgres`]: durable storage on a shared `sqlx` connection pool
//! - [`memory`]: process-local maps for development and tests
//!
//! Author: hephaex@gmail.com

pub mod memory;
pub mod postgres;

pub use memory::{InMemoryAccountStore, InMemoryRefreshTokenStore};
pub use postgres::{connect, ensure_schema, PgAccountStore, PgRefreshTokenStore};
