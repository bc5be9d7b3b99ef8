//! Topic-bound producer.
//!
//! One producer per topic, owned by the event handler that publishes through
//! it. Publishing never retries; retry policy belongs to the caller.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error, info};

use super::{BusError, Message, MessageWriter, Result};

/// Publishes key/value messages to a single topic.
pub struct Producer {
    writer: Box<dyn MessageWriter>,
    topic: String,
    closed: AtomicBool,
}

impl std::fmt::Debug for Producer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer")
            .field("topic", &self.topic)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl Producer {
    /// Bind a writer to `topic`.
    ///
    /// An empty topic is a configuration error; the writer is never touched.
    pub fn new(writer: Box<dyn MessageWriter>, topic: impl Into<String>) -> Result<Self> {
        let topic = validate_topic(topic.into())?;
        Ok(Self {
            writer,
            topic,
            closed: AtomicBool::new(false),
        })
    }

    /// Create a Kafka-backed producer. The topic is validated before any
    /// client is created.
    #[cfg(feature = "kafka")]
    pub fn connect(config: &super::kafka::KafkaClientConfig, topic: impl Into<String>) -> Result<Self> {
        let topic = validate_topic(topic.into())?;
        let writer = super::kafka::KafkaWriter::new(config)?;
        info!(topic = %topic, brokers = %config.bootstrap_servers(), "Kafka producer created");
        Self::new(Box::new(writer), topic)
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Write one message. Transport errors are returned unchanged.
    pub async fn publish(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }

        let message = Message::outbound(&self.topic, key.as_ref(), value.as_ref());
        let key_display = message.key_str().into_owned();

        match self.writer.write(message).await {
            Ok(()) => {
                debug!(topic = %self.topic, key = %key_display, "Message published");
                Ok(())
            }
            Err(e) => {
                error!(topic = %self.topic, key = %key_display, error = %e, "Failed to publish message");
                Err(e)
            }
        }
    }

    /// Flush and release the transport. Calling it again is a no-op.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!(topic = %self.topic, "Closing producer");
        self.writer.close().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

fn validate_topic(topic: String) -> Result<String> {
    if topic.trim().is_empty() {
        return Err(BusError::Config("producer topic must be specified".to_string()));
    }
    Ok(topic)
}
