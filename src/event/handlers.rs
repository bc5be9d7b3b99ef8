//! Stock event handlers.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{DomainEvent, EventError, EventHandler};
use crate::bus::Producer;

/// Logs every event it receives.
pub struct LogOnlyHandler {
    prefix: String,
}

impl LogOnlyHandler {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

#[async_trait]
impl EventHandler for LogOnlyHandler {
    fn name(&self) -> &str {
        "log-only"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), EventError> {
        info!(
            event = %event.name(),
            occurred_at = %event.occurred_at(),
            payload = %event.payload(),
            "{}", self.prefix
        );
        Ok(())
    }
}

/// Externalizes events onto the broker through a topic-bound producer.
pub struct PublishingHandler {
    producer: Arc<Producer>,
}

impl PublishingHandler {
    pub fn new(producer: Arc<Producer>) -> Self {
        Self { producer }
    }

    /// Event key, else the payload's `id` field, else empty.
    fn message_key(event: &DomainEvent) -> String {
        if let Some(key) = event.key() {
            return key.to_string();
        }
        match event.payload().get("id") {
            Some(serde_json::Value::String(id)) => id.clone(),
            Some(serde_json::Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }
}

#[async_trait]
impl EventHandler for PublishingHandler {
    fn name(&self) -> &str {
        "publishing"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), EventError> {
        let value = serde_json::to_vec(event.payload())?;
        let key = Self::message_key(event);
        self.producer.publish(key, value).await?;
        Ok(())
    }
}
