//! Broker, consumer and dispatcher configuration types.

use std::time::Duration;

use serde::Deserialize;

use super::ConfigError;
use crate::bus::{ConsumerSettings, FailurePolicy, StartOffset};
use crate::bus::consumer::{DEFAULT_MAX_BYTES, DEFAULT_MIN_BYTES};
use crate::event::DispatchMode;

/// Kafka connection configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    /// Comma-separated `host:port` list.
    pub brokers: String,
    /// Consumer group id sent by readers.
    pub group_id: String,
    /// Producer delivery timeout.
    pub message_timeout_ms: u64,
    /// Security protocol (PLAINTEXT, SSL, SASL_PLAINTEXT, SASL_SSL).
    pub security_protocol: Option<String>,
    /// SASL mechanism (PLAIN, SCRAM-SHA-256, SCRAM-SHA-512).
    pub sasl_mechanism: Option<String>,
    pub sasl_username: Option<String>,
    pub sasl_password: Option<String>,
    /// SSL CA certificate path.
    pub ssl_ca_location: Option<String>,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            group_id: "replica-bridge".to_string(),
            message_timeout_ms: 5000,
            security_protocol: None,
            sasl_mechanism: None,
            sasl_username: None,
            sasl_password: None,
            ssl_ca_location: None,
        }
    }
}

impl KafkaConfig {
    /// Parse the broker list. Entries are trimmed; an empty list or an empty
    /// entry is rejected.
    pub fn broker_list(&self) -> Result<Vec<String>, ConfigError> {
        parse_brokers(&self.brokers)
    }

    /// Client configuration for the Kafka transport.
    #[cfg(feature = "kafka")]
    pub fn client_config(&self) -> Result<crate::bus::KafkaClientConfig, ConfigError> {
        let mut config = crate::bus::KafkaClientConfig::new(self.broker_list()?)
            .with_group_id(&self.group_id)
            .with_message_timeout_ms(self.message_timeout_ms);

        if let (Some(username), Some(password)) = (&self.sasl_username, &self.sasl_password) {
            let mechanism = self.sasl_mechanism.as_deref().unwrap_or("PLAIN");
            config = config.with_sasl(username, password, mechanism);
        }
        if let Some(ref protocol) = self.security_protocol {
            config = config.with_security_protocol(protocol);
        }
        if let Some(ref ca) = self.ssl_ca_location {
            config = config.with_ssl_ca(ca);
        }
        Ok(config)
    }
}

/// Split a comma-separated broker list.
pub fn parse_brokers(raw: &str) -> Result<Vec<String>, ConfigError> {
    if raw.trim().is_empty() {
        return Err(ConfigError::InvalidBrokers("broker list is empty".to_string()));
    }

    raw.split(',')
        .map(|entry| {
            let entry = entry.trim();
            if entry.is_empty() {
                Err(ConfigError::InvalidBrokers(format!("empty entry in '{}'", raw)))
            } else {
                Ok(entry.to_string())
            }
        })
        .collect()
}

/// Consumer pool configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    pub read_timeout_secs: u64,
    pub min_bytes: usize,
    pub max_bytes: usize,
    pub start_offset: StartOffset,
    pub failure_policy: FailurePolicy,
    /// Ceiling for the pause after a transient read error.
    pub max_read_backoff_ms: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            read_timeout_secs: 10,
            min_bytes: DEFAULT_MIN_BYTES,
            max_bytes: DEFAULT_MAX_BYTES,
            start_offset: StartOffset::Earliest,
            failure_policy: FailurePolicy::Halt,
            max_read_backoff_ms: 5000,
        }
    }
}

impl ConsumerConfig {
    pub fn settings(&self) -> ConsumerSettings {
        ConsumerSettings {
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            min_bytes: self.min_bytes,
            max_bytes: self.max_bytes,
            start_offset: self.start_offset,
            failure_policy: self.failure_policy.clone(),
            max_read_backoff: Duration::from_millis(self.max_read_backoff_ms),
        }
    }
}

/// Event dispatcher configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub mode: DispatchMode,
}
