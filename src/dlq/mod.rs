//! Dead Letter Queue (DLQ) for messages a consumer handler could not process.
//!
//! ## Topic Naming
//!
//! DLQ topics follow the pattern: `{source_topic}.dlq`
//! (`pessoa.saved` -> `pessoa.saved.dlq`).
//!
//! ## Message Format
//!
//! A JSON [`DeadLetter`] envelope carrying the original key and value (as
//! text), the source position, the handler error and the number of attempts.
//! The message key is the original key so replays land on the same partition.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bus::{Message, MessageWriter};

/// DLQ topic suffix. Full topic: `{source_topic}{suffix}`
pub const DLQ_TOPIC_SUFFIX: &str = ".dlq";

/// Build the DLQ topic name for a source topic.
pub fn dlq_topic(source_topic: &str) -> String {
    format!("{}{}", source_topic, DLQ_TOPIC_SUFFIX)
}

/// Errors that can occur during DLQ operations.
#[derive(Debug, thiserror::Error)]
pub enum DlqError {
    #[error("Failed to serialize dead letter: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to publish to DLQ: {0}")]
    PublishFailed(String),
}

/// A message that failed processing, as written to the DLQ topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub id: Uuid,
    pub source_topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: String,
    pub value: String,
    pub error: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    /// Capture a failed message with the error that rejected it.
    pub fn from_message(message: &Message, error: impl ToString, attempts: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_topic: message.topic.clone(),
            partition: message.partition,
            offset: message.offset,
            key: message.key_str().into_owned(),
            value: String::from_utf8_lossy(&message.value).into_owned(),
            error: error.to_string(),
            attempts,
            failed_at: Utc::now(),
        }
    }

    /// Destination topic for this dead letter.
    pub fn topic(&self) -> String {
        dlq_topic(&self.source_topic)
    }

    /// Encode as the outbound broker message.
    pub fn to_message(&self) -> Result<Message, DlqError> {
        let value = serde_json::to_vec(self)?;
        Ok(Message::outbound(self.topic(), self.key.as_bytes(), value))
    }
}

/// Trait for publishing messages to a dead letter queue.
#[async_trait]
pub trait DeadLetterPublisher: Send + Sync {
    async fn publish(&self, dead_letter: DeadLetter) -> Result<(), DlqError>;
}

/// Publishes dead letters through a broker writer.
pub struct BrokerDeadLetterPublisher {
    writer: Arc<dyn MessageWriter>,
}

impl BrokerDeadLetterPublisher {
    pub fn new(writer: Arc<dyn MessageWriter>) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl DeadLetterPublisher for BrokerDeadLetterPublisher {
    async fn publish(&self, dead_letter: DeadLetter) -> Result<(), DlqError> {
        let message = dead_letter.to_message()?;
        warn!(
            topic = %message.topic,
            source_offset = dead_letter.offset,
            error = %dead_letter.error,
            "Routing message to DLQ"
        );
        self.writer
            .write(message)
            .await
            .map_err(|e| DlqError::PublishFailed(e.to_string()))
    }
}

/// In-memory DLQ publisher using a channel.
///
/// Used for standalone mode and testing.
pub struct ChannelDeadLetterPublisher {
    sender: mpsc::UnboundedSender<DeadLetter>,
}

impl ChannelDeadLetterPublisher {
    /// Returns the publisher and a receiver for consuming dead letters.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DeadLetter>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl DeadLetterPublisher for ChannelDeadLetterPublisher {
    async fn publish(&self, dead_letter: DeadLetter) -> Result<(), DlqError> {
        info!(topic = %dead_letter.topic(), error = %dead_letter.error, "Publishing to channel DLQ");
        self.sender
            .send(dead_letter)
            .map_err(|e| DlqError::PublishFailed(e.to_string()))
    }
}
