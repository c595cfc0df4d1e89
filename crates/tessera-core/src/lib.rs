//! Tessera Core - session domain types and capability traits
//!
//! This crate holds everything the session service shares between its
//! storage backends, the HTTP layer and the operator CLI:
//!
//! - [`models`]: accounts and refresh-token records
//! - [`store`]: the two narrow storage capabilities (accounts, refresh tokens)
//! - [`events`]: the session lifecycle event envelope and publisher trait
//! - [`validation`]: email and password policy checks
//! - [`config`]: application configuration
//!
//! Author: hephaex@gmail.com

pub mod config;
pub mod events;
pub mod models;
pub mod store;
pub mod validation;

pub use config::{AppConfig, ConfigError};
pub use events::{Event, EventError, EventPublisher, EventType};
pub use models::{Account, AccountPublic, RefreshToken, TokenState};
pub use store::{AccountStore, RefreshTokenStore, RevokeOutcome, StoreError, StoreResult};
pub use validation::{is_valid_email, normalize_email, validate_password_strength, PasswordPolicy};
