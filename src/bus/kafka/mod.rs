//! Kafka transport.
//!
//! Implements the admin, writer and reader seams on `rdkafka`.
//! Message key: caller-supplied identifier. Message value: JSON DTO.
//!
//! Readers are bound to a single broker, topic and partition through manual
//! assignment; no consumer-group rebalancing and no offset commits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message as _;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer as _};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::util::Timeout;
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use tracing::{debug, info};

use super::provisioner::TopicSpec;
use super::{
    AdminConnection, BrokerConnector, BusError, Message, MessageReader, MessageWriter,
    ReaderFactory, ReaderOptions, Result, StartOffset,
};

/// Default consumer group id. Readers use manual assignment, so the group
/// only identifies the client to the cluster.
pub const DEFAULT_GROUP_ID: &str = "replica-bridge";

/// Configuration for Kafka clients.
#[derive(Clone, Debug)]
pub struct KafkaClientConfig {
    /// Broker addresses (`host:port`).
    pub brokers: Vec<String>,
    /// Consumer group id sent by readers.
    pub group_id: String,
    /// Producer delivery timeout (`message.timeout.ms`).
    pub message_timeout_ms: u64,
    /// Timeout for admin operations and metadata probes.
    pub admin_timeout: Duration,
    /// SASL username (optional, for authenticated clusters).
    pub sasl_username: Option<String>,
    /// SASL password (optional, for authenticated clusters).
    pub sasl_password: Option<String>,
    /// SASL mechanism (PLAIN, SCRAM-SHA-256, SCRAM-SHA-512).
    pub sasl_mechanism: Option<String>,
    /// Security protocol (PLAINTEXT, SSL, SASL_PLAINTEXT, SASL_SSL).
    pub security_protocol: Option<String>,
    /// SSL CA certificate path (for SSL connections).
    pub ssl_ca_location: Option<String>,
}

impl KafkaClientConfig {
    pub fn new(brokers: Vec<String>) -> Self {
        Self {
            brokers,
            group_id: DEFAULT_GROUP_ID.to_string(),
            message_timeout_ms: 5000,
            admin_timeout: Duration::from_secs(10),
            sasl_username: None,
            sasl_password: None,
            sasl_mechanism: None,
            security_protocol: None,
            ssl_ca_location: None,
        }
    }

    /// Add SASL authentication.
    pub fn with_sasl(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
        mechanism: impl Into<String>,
    ) -> Self {
        self.sasl_username = Some(username.into());
        self.sasl_password = Some(password.into());
        self.sasl_mechanism = Some(mechanism.into());
        self.security_protocol = Some("SASL_SSL".to_string());
        self
    }

    /// Set security protocol.
    pub fn with_security_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.security_protocol = Some(protocol.into());
        self
    }

    /// Set SSL CA certificate location.
    pub fn with_ssl_ca(mut self, ca_location: impl Into<String>) -> Self {
        self.ssl_ca_location = Some(ca_location.into());
        self
    }

    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = group_id.into();
        self
    }

    pub fn with_message_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.message_timeout_ms = timeout_ms;
        self
    }

    /// Comma-separated broker list for `bootstrap.servers`.
    pub fn bootstrap_servers(&self) -> String {
        self.brokers.join(",")
    }

    fn base_config(&self, bootstrap_servers: &str) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", bootstrap_servers);
        self.apply_security_config(&mut config);
        config
    }

    /// Build a ClientConfig for producers.
    fn build_producer_config(&self) -> ClientConfig {
        let mut config = self.base_config(&self.bootstrap_servers());
        config.set("message.timeout.ms", self.message_timeout_ms.to_string());
        config.set("acks", "all");
        config
    }

    /// Build a ClientConfig for a single-broker reader.
    fn build_reader_config(&self, options: &ReaderOptions) -> ClientConfig {
        let mut config = self.base_config(&options.broker);
        config.set("group.id", &self.group_id);
        config.set("enable.auto.commit", "false");
        config.set("fetch.min.bytes", options.min_bytes.to_string());
        config.set("fetch.max.bytes", options.max_bytes.to_string());
        config
    }

    /// Build a ClientConfig for an admin connection to one broker.
    fn build_admin_config(&self, address: &str) -> ClientConfig {
        self.base_config(address)
    }

    /// Apply security settings to a ClientConfig.
    fn apply_security_config(&self, config: &mut ClientConfig) {
        if let Some(ref protocol) = self.security_protocol {
            config.set("security.protocol", protocol);
        }

        if let Some(ref mechanism) = self.sasl_mechanism {
            config.set("sasl.mechanism", mechanism);
        }

        if let Some(ref username) = self.sasl_username {
            config.set("sasl.username", username);
        }

        if let Some(ref password) = self.sasl_password {
            config.set("sasl.password", password);
        }

        if let Some(ref ca_location) = self.ssl_ca_location {
            config.set("ssl.ca.location", ca_location);
        }
    }
}

// ============================================================================
// Admin
// ============================================================================

/// Dials individual brokers with an admin client.
pub struct KafkaConnector {
    config: KafkaClientConfig,
}

impl KafkaConnector {
    pub fn new(config: KafkaClientConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BrokerConnector for KafkaConnector {
    async fn dial(&self, address: &str) -> Result<Box<dyn AdminConnection>> {
        let client: AdminClient<DefaultClientContext> = self
            .config
            .build_admin_config(address)
            .create()
            .map_err(|e| BusError::Connection(format!("Failed to create Kafka admin client: {}", e)))?;
        let client = Arc::new(client);

        // Client creation is lazy; a metadata round trip proves the broker answers.
        let probe = client.clone();
        let timeout = self.config.admin_timeout;
        tokio::task::spawn_blocking(move || probe.inner().fetch_metadata(None, timeout).map(|_| ()))
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?
            .map_err(|e| BusError::Connection(format!("{}: {}", address, e)))?;

        debug!(broker = %address, "Connected to Kafka broker");

        Ok(Box::new(KafkaAdmin {
            client,
            address: address.to_string(),
            timeout,
        }))
    }
}

struct KafkaAdmin {
    client: Arc<AdminClient<DefaultClientContext>>,
    address: String,
    timeout: Duration,
}

#[async_trait]
impl AdminConnection for KafkaAdmin {
    /// librdkafka routes CreateTopics to the controller itself and does not
    /// expose the controller id, so the dialed broker stands in for it.
    async fn controller(&self) -> Result<String> {
        Ok(self.address.clone())
    }

    async fn create_topic(&self, topic: &TopicSpec) -> Result<()> {
        let new_topic = NewTopic::new(
            &topic.name,
            topic.partitions,
            TopicReplication::Fixed(topic.replication_factor),
        );
        let options = AdminOptions::new().operation_timeout(Some(self.timeout));

        let results = self
            .client
            .create_topics([&new_topic], &options)
            .await
            .map_err(|e| BusError::Admin(e.to_string()))?;

        for result in results {
            match result {
                Ok(_) => {}
                Err((name, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    return Err(BusError::TopicAlreadyExists(name))
                }
                Err((name, code)) => return Err(BusError::Admin(format!("{}: {}", name, code))),
            }
        }
        Ok(())
    }
}

// ============================================================================
// Writer
// ============================================================================

/// Writes messages with a `FutureProducer`.
pub struct KafkaWriter {
    producer: FutureProducer,
    flush_timeout: Duration,
}

impl KafkaWriter {
    pub fn new(config: &KafkaClientConfig) -> Result<Self> {
        let producer: FutureProducer = config
            .build_producer_config()
            .create()
            .map_err(|e| BusError::Connection(format!("Failed to create Kafka producer: {}", e)))?;

        info!(bootstrap_servers = %config.bootstrap_servers(), "Connected to Kafka");

        Ok(Self {
            producer,
            flush_timeout: Duration::from_millis(config.message_timeout_ms),
        })
    }
}

#[async_trait]
impl MessageWriter for KafkaWriter {
    async fn write(&self, message: Message) -> Result<()> {
        let record = FutureRecord::to(&message.topic)
            .key(&message.key)
            .payload(&message.value);

        // Delivery is bounded by message.timeout.ms.
        let (partition, offset) = self
            .producer
            .send(record, Timeout::Never)
            .await
            .map_err(|(e, _)| BusError::Publish(format!("Failed to publish: {}", e)))?;

        debug!(topic = %message.topic, partition = partition, offset = offset, "Published to Kafka");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let producer = self.producer.clone();
        let timeout = self.flush_timeout;
        tokio::task::spawn_blocking(move || producer.flush(timeout))
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?
            .map_err(|e| BusError::Publish(format!("Failed to flush producer: {}", e)))
    }
}

// ============================================================================
// Reader
// ============================================================================

/// Opens partition-assigned `StreamConsumer`s.
pub struct KafkaReaderFactory {
    config: KafkaClientConfig,
}

impl KafkaReaderFactory {
    pub fn new(config: KafkaClientConfig) -> Self {
        Self { config }
    }
}

impl ReaderFactory for KafkaReaderFactory {
    fn open(&self, options: &ReaderOptions) -> Result<Box<dyn MessageReader>> {
        let consumer: StreamConsumer = self
            .config
            .build_reader_config(options)
            .create()
            .map_err(|e| BusError::Connection(format!("Failed to create Kafka consumer: {}", e)))?;

        let offset = match options.start_offset {
            StartOffset::Earliest => Offset::Beginning,
            StartOffset::Latest => Offset::End,
        };

        let mut assignment = TopicPartitionList::new();
        assignment
            .add_partition_offset(&options.topic, options.partition, offset)
            .map_err(|e| BusError::Config(e.to_string()))?;
        consumer
            .assign(&assignment)
            .map_err(|e| BusError::Connection(format!("Failed to assign partition: {}", e)))?;

        info!(
            broker = %options.broker,
            topic = %options.topic,
            partition = options.partition,
            "Kafka reader assigned"
        );

        Ok(Box::new(KafkaReader { consumer }))
    }
}

struct KafkaReader {
    consumer: StreamConsumer,
}

#[async_trait]
impl MessageReader for KafkaReader {
    async fn read(&mut self) -> Result<Message> {
        let received = self
            .consumer
            .recv()
            .await
            .map_err(|e| BusError::Read(e.to_string()))?;

        Ok(Message {
            topic: received.topic().to_string(),
            partition: received.partition(),
            offset: received.offset(),
            key: received.key().map(<[u8]>::to_vec).unwrap_or_default(),
            value: received.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        })
    }
}
