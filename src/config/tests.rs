use super::*;
use crate::bus::{FailurePolicy, StartOffset};
use crate::event::DispatchMode;
use serial_test::serial;
use std::io::Write;
use std::time::Duration;

fn clear_env() {
    for var in [
        CONFIG_ENV_VAR,
        LEGACY_BROKERS_ENV_VAR,
        "REPLICA__KAFKA__BROKERS",
        "REPLICA__CONSUMER__READ_TIMEOUT_SECS",
    ] {
        std::env::remove_var(var);
    }
}

fn yaml_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_config_default() {
    let config = Config::default();
    assert_eq!(config.kafka.brokers, "localhost:9092");
    assert_eq!(config.consumer.read_timeout_secs, 10);
    assert_eq!(config.consumer.failure_policy, FailurePolicy::Halt);
    assert_eq!(config.dispatcher.mode, DispatchMode::ContinueAndCollect);
    assert_eq!(config.storage.storage_type, StorageType::Sqlite);
    assert!(config.topics.is_none());
}

#[test]
fn test_parse_brokers_trims_entries() {
    let brokers = parse_brokers(" kafka-1:9092 , kafka-2:9092").unwrap();
    assert_eq!(brokers, vec!["kafka-1:9092", "kafka-2:9092"]);
}

#[test]
fn test_parse_brokers_rejects_empty() {
    assert!(matches!(parse_brokers(""), Err(ConfigError::InvalidBrokers(_))));
    assert!(matches!(parse_brokers("  "), Err(ConfigError::InvalidBrokers(_))));
    assert!(matches!(
        parse_brokers("kafka-1:9092,,kafka-2:9092"),
        Err(ConfigError::InvalidBrokers(_))
    ));
}

#[test]
fn test_consumer_settings_conversion() {
    let config = ConsumerConfig {
        read_timeout_secs: 3,
        max_read_backoff_ms: 250,
        ..ConsumerConfig::default()
    };
    let settings = config.settings();
    assert_eq!(settings.read_timeout, Duration::from_secs(3));
    assert_eq!(settings.max_read_backoff, Duration::from_millis(250));
    assert_eq!(settings.min_bytes, 10_000);
    assert_eq!(settings.max_bytes, 10_000_000);
}

#[test]
fn test_topics_fallback() {
    let mut config = Config::default();
    assert_eq!(config.topics_or(&["pessoa.saved"]), vec!["pessoa.saved"]);

    config.topics = Some(vec!["custom".to_string()]);
    assert_eq!(config.topics_or(&["pessoa.saved"]), vec!["custom"]);
}

#[test]
#[serial]
fn test_load_from_file() {
    clear_env();
    let file = yaml_file(
        r#"
kafka:
  brokers: "kafka-1:9092,kafka-2:9092"
consumer:
  read_timeout_secs: 2
  start_offset: latest
  failure_policy:
    type: retry
    max_attempts: 4
    min_delay_ms: 10
    max_delay_ms: 200
dispatcher:
  mode: fail_fast
storage:
  type: memory
topics:
  - pessoa.saved
"#,
    );

    let config = Config::load(file.path().to_str()).unwrap();

    assert_eq!(config.kafka.broker_list().unwrap().len(), 2);
    assert_eq!(config.consumer.read_timeout_secs, 2);
    assert_eq!(config.consumer.start_offset, StartOffset::Latest);
    assert_eq!(
        config.consumer.failure_policy,
        FailurePolicy::Retry {
            max_attempts: 4,
            min_delay_ms: 10,
            max_delay_ms: 200
        }
    );
    assert_eq!(config.dispatcher.mode, DispatchMode::FailFast);
    assert_eq!(config.storage.storage_type, StorageType::Memory);
    assert_eq!(config.topics, Some(vec!["pessoa.saved".to_string()]));
}

#[test]
#[serial]
fn test_env_overrides_file() {
    clear_env();
    let file = yaml_file("kafka:\n  brokers: \"file:9092\"\n");
    std::env::set_var(CONFIG_ENV_VAR, file.path());
    std::env::set_var("REPLICA__KAFKA__BROKERS", "env:9092");

    let config = Config::load(None);
    clear_env();

    assert_eq!(config.unwrap().kafka.brokers, "env:9092");
}

#[test]
#[serial]
fn test_legacy_brokers_variable_wins() {
    clear_env();
    std::env::set_var("REPLICA__KAFKA__BROKERS", "env:9092");
    std::env::set_var(LEGACY_BROKERS_ENV_VAR, "legacy-1:9092, legacy-2:9092");

    let config = Config::load(None);
    clear_env();

    let config = config.unwrap();
    assert_eq!(
        config.kafka.broker_list().unwrap(),
        vec!["legacy-1:9092", "legacy-2:9092"]
    );
}

#[test]
#[serial]
fn test_load_rejects_empty_broker_entry() {
    clear_env();
    std::env::set_var(LEGACY_BROKERS_ENV_VAR, "kafka-1:9092,");

    let result = Config::load(None);
    clear_env();

    assert!(matches!(result, Err(ConfigError::InvalidBrokers(_))));
}

#[test]
#[serial]
fn test_missing_explicit_file_fails() {
    clear_env();
    let result = Config::load(Some("/nonexistent/replica.yaml"));
    assert!(matches!(result, Err(ConfigError::Load(_))));
}
