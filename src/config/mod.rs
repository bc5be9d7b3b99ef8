//! Configuration types.

mod messaging;
mod storage;

pub use messaging::{parse_brokers, ConsumerConfig, DispatcherConfig, KafkaConfig};
pub use storage::{StorageConfig, StorageType};

use serde::Deserialize;

/// Default config file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for config file path.
pub const CONFIG_ENV_VAR: &str = "REPLICA_CONFIG";
/// Environment variable prefix for config overrides (`REPLICA__KAFKA__BROKERS`).
pub const CONFIG_ENV_PREFIX: &str = "REPLICA";
/// Environment variable for log filter.
pub const LOG_ENV_VAR: &str = "REPLICA_LOG";
/// Legacy environment variable holding the comma-separated broker list.
pub const LEGACY_BROKERS_ENV_VAR: &str = "KAFKA_BROKERS";

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid broker list: {0}")]
    InvalidBrokers(String),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub kafka: KafkaConfig,
    pub consumer: ConsumerConfig,
    pub dispatcher: DispatcherConfig,
    pub storage: StorageConfig,
    /// Topics to provision at startup. Each binary falls back to its own set.
    pub topics: Option<Vec<String>>,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    /// 5. `KAFKA_BROKERS` (legacy)
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Config = config.try_deserialize()?;

        if let Ok(brokers) = std::env::var(LEGACY_BROKERS_ENV_VAR) {
            config.kafka.brokers = brokers;
        }

        config.kafka.broker_list()?;
        Ok(config)
    }

    /// Topics to provision, or `fallback` when none are configured.
    pub fn topics_or(&self, fallback: &[&str]) -> Vec<String> {
        match &self.topics {
            Some(topics) => topics.clone(),
            None => fallback.iter().map(|t| t.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests;
