//! Session lifecycle events
//!
//! Every event travels in the same envelope:
//! `{id, type, source, data, timestamp, version}`.
//! Publication is best-effort; a failed publish never fails the request
//! that triggered it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Envelope schema version
pub const EVENT_VERSION: &str = "1.0";

/// Event type identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "account.registered")]
    AccountRegistered,
    #[serde(rename = "account.logged_in")]
    AccountLoggedIn,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::AccountRegistered => "account.registered",
            EventType::AccountLoggedIn => "account.logged_in",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of `account.registered`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRegisteredData {
    pub account_id: Uuid,
    pub email: String,
}

/// Payload of `account.logged_in`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountLoggedInData {
    pub account_id: Uuid,
    pub email: String,
    pub login_time: DateTime<Utc>,
}

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub source: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

impl Event {
    /// Wrap a payload in a fresh envelope
    pub fn new<T: Serialize>(
        event_type: EventType,
        source: &str,
        data: &T,
    ) -> Result<Self, EventError> {
        Ok(Self {
            id: Uuid::new_v4(),
            event_type,
            source: source.to_string(),
            data: serde_json::to_value(data)?,
            timestamp: Utc::now(),
            version: EVENT_VERSION.to_string(),
        })
    }

    pub fn account_registered(
        source: &str,
        account_id: Uuid,
        email: &str,
    ) -> Result<Self, EventError> {
        Self::new(
            EventType::AccountRegistered,
            source,
            &AccountRegisteredData {
                account_id,
                email: email.to_string(),
            },
        )
    }

    pub fn account_logged_in(
        source: &str,
        account_id: Uuid,
        email: &str,
        login_time: DateTime<Utc>,
    ) -> Result<Self, EventError> {
        Self::new(
            EventType::AccountLoggedIn,
            source,
            &AccountLoggedInData {
                account_id,
                email: email.to_string(),
                login_time,
            },
        )
    }
}

/// Event publication errors
#[derive(Debug, Error)]
pub enum EventError {
    #[error("Failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Event delivery failed: {0}")]
    Delivery(String),
}

/// Sink for session lifecycle events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &Event) -> Result<(), EventError>;
}
