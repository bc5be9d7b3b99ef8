//! Broker plumbing for cross-service replication.
//!
//! This module contains:
//! - `Message`: the key/value wire envelope
//! - Transport traits: `BrokerConnector`/`AdminConnection` (topic admin),
//!   `MessageWriter` (publishing), `ReaderFactory`/`MessageReader` (consuming)
//! - Components built on those traits: topic provisioner, producer, consumer pool
//! - Implementations: Kafka (`kafka` feature), in-memory broker

use async_trait::async_trait;

// Implementation modules
pub mod consumer;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;
pub mod producer;
pub mod provisioner;

// Re-exports
pub use consumer::{
    ConsumerError, ConsumerPool, ConsumerSettings, ConsumerSpec, FailurePolicy, HandlerError,
    MessageHandler, PoolHandle, StartOffset,
};
#[cfg(feature = "kafka")]
pub use kafka::{KafkaClientConfig, KafkaConnector, KafkaReaderFactory, KafkaWriter};
pub use memory::MemoryBroker;
pub use producer::Producer;
pub use provisioner::{ensure_topics, ProvisionError, TopicSpec};

// ============================================================================
// Errors
// ============================================================================

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Read timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Read failed: {0}")]
    Read(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Topic '{0}' already exists")]
    TopicAlreadyExists(String),

    #[error("Admin operation failed: {0}")]
    Admin(String),

    #[error("Transport closed")]
    Closed,
}

impl BusError {
    /// Errors the consumer loop retries indefinitely.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Read(_) | Self::Connection(_)
        )
    }
}

// ============================================================================
// Wire envelope
// ============================================================================

/// A message as read from (or written to) a topic partition.
///
/// `value` carries the JSON-encoded DTO; `key` is the caller-supplied
/// identifier and is not interpreted by this layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Message {
    /// Build an outbound message; partition and offset are assigned by the broker.
    pub fn outbound(topic: impl Into<String>, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            partition: 0,
            offset: -1,
            key: key.into(),
            value: value.into(),
        }
    }

    /// Key rendered for logging.
    pub fn key_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.key)
    }
}

// ============================================================================
// Transport traits
// ============================================================================

/// Opens administrative connections to individual brokers.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Dial a single broker address (`host:port`).
    async fn dial(&self, address: &str) -> Result<Box<dyn AdminConnection>>;
}

/// An open administrative connection to one broker.
///
/// Dropping the connection releases it.
#[async_trait]
pub trait AdminConnection: Send + Sync {
    /// Address of the cluster controller as seen by this broker.
    async fn controller(&self) -> Result<String>;

    /// Create a topic. Returns `BusError::TopicAlreadyExists` if it is present.
    async fn create_topic(&self, topic: &provisioner::TopicSpec) -> Result<()>;
}

/// Writes messages to the broker.
#[async_trait]
pub trait MessageWriter: Send + Sync {
    /// Write one message. No retry is attempted here.
    async fn write(&self, message: Message) -> Result<()>;

    /// Flush pending writes and release the underlying client.
    async fn close(&self) -> Result<()>;
}

/// Reads messages from one topic partition on one broker.
#[async_trait]
pub trait MessageReader: Send {
    /// Wait for the next message. Callers bound the wait with their own timeout.
    async fn read(&mut self) -> Result<Message>;
}

/// Parameters for opening a reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderOptions {
    pub broker: String,
    pub topic: String,
    pub partition: i32,
    pub min_bytes: usize,
    pub max_bytes: usize,
    pub start_offset: StartOffset,
}

/// Opens readers bound to a single broker, topic and partition.
pub trait ReaderFactory: Send + Sync {
    fn open(&self, options: &ReaderOptions) -> Result<Box<dyn MessageReader>>;
}
