//! Event publishers
//!
//! Implementations of [`EventPublisher`] selected by `events.sink`:
//! a structured log record, a JSON webhook, or nothing at all.
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tessera_core::config::{EventSink, EventsConfig};
use tessera_core::events::{Event, EventError, EventPublisher};

/// Writes each event as a tracing record under the `events` target
#[derive(Debug, Default, Clone)]
pub struct LogEventPublisher;

#[async_trait]
impl EventPublisher for LogEventPublisher {
    async fn publish(&self, event: &Event) -> Result<(), EventError> {
        let payload = serde_json::to_string(event)?;
        tracing::info!(
            target: "events",
            event_id = %event.id,
            event_type = %event.event_type,
            source = %event.source,
            payload = %payload,
            "Event published"
        );
        Ok(())
    }
}

/// POSTs each event as JSON to a fixed URL
pub struct WebhookEventPublisher {
    client: Client,
    url: String,
}

impl WebhookEventPublisher {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, EventError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EventError::Delivery(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl EventPublisher for WebhookEventPublisher {
    async fn publish(&self, event: &Event) -> Result<(), EventError> {
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("X-Event-Type", event.event_type.as_str())
            .header("X-Event-Source", event.source.as_str())
            .json(event)
            .send()
            .await
            .map_err(|e| EventError::Delivery(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EventError::Delivery(format!(
                "Webhook returned {status}: {body}"
            )));
        }

        Ok(())
    }
}

/// Discards every event
#[derive(Debug, Default, Clone)]
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(&self, _event: &Event) -> Result<(), EventError> {
        Ok(())
    }
}

/// Build the publisher configured by `events.sink`
pub fn publisher_from_config(config: &EventsConfig) -> Result<Arc<dyn EventPublisher>, EventError> {
    match config.sink {
        EventSink::Log => Ok(Arc::new(LogEventPublisher)),
        EventSink::None => Ok(Arc::new(NoopEventPublisher)),
        EventSink::Webhook => {
            let url = config.webhook_url.as_deref().ok_or_else(|| {
                EventError::Delivery(
                    "events.webhook_url is required for the webhook sink".to_string(),
                )
            })?;
            Ok(Arc::new(WebhookEventPublisher::new(
                url,
                Duration::from_secs(config.timeout_secs),
            )?))
        }
    }
}

/// Keeps published events in memory, or fails every publish
#[cfg(any(test, feature = "test-utils"))]
#[derive(Default)]
pub struct MemoryEventPublisher {
    events: tokio::sync::Mutex<Vec<Event>>,
    fail: bool,
}

#[cfg(any(test, feature = "test-utils"))]
impl MemoryEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A publisher whose every delivery fails
    pub fn failing() -> Self {
        Self {
            events: Default::default(),
            fail: true,
        }
    }

    pub async fn events(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl EventPublisher for MemoryEventPublisher {
    async fn publish(&self, event: &Event) -> Result<(), EventError> {
        if self.fail {
            return Err(EventError::Delivery("sink unavailable".to_string()));
        }
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_log_and_noop_publishers_succeed() {
        let event = Event::account_registered("auth-service", Uuid::new_v4(), "a@example.com")
            .unwrap();

        assert!(LogEventPublisher.publish(&event).await.is_ok());
        assert!(NoopEventPublisher.publish(&event).await.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_webhook_is_delivery_error() {
        // Port 9 (discard) on localhost is expected to refuse connections
        let publisher =
            WebhookEventPublisher::new("http://127.0.0.1:9/events", Duration::from_millis(500))
                .unwrap();
        let event = Event::account_registered("auth-service", Uuid::new_v4(), "a@example.com")
            .unwrap();

        assert!(matches!(
            publisher.publish(&event).await,
            Err(EventError::Delivery(_))
        ));
    }

    #[test]
    fn test_publisher_from_config() {
        let mut config = EventsConfig::default();
        assert!(publisher_from_config(&config).is_ok());

        config.sink = EventSink::Webhook;
        assert!(publisher_from_config(&config).is_err());

        config.webhook_url = Some("http://localhost:9000/hooks".to_string());
        assert!(publisher_from_config(&config).is_ok());
    }
}
