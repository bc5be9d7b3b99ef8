//! curso-replica: consuming side of the people replication.
//!
//! Provisions the course service topics, opens the local replica and runs
//! the consumer pool on `pessoa.saved` until Ctrl+C.
//!
//! ## Architecture
//! ```text
//! [Kafka: pessoa.saved] -> [ConsumerPool] -> [ReplicationHandler] -> [Replica]
//!                               |
//!                               v (failure_policy: dead_letter)
//!                    [Kafka: pessoa.saved.dlq]
//! ```
//!
//! ## Configuration
//! - KAFKA_BROKERS / REPLICA__KAFKA__BROKERS: comma-separated broker list
//! - REPLICA__STORAGE__TYPE: `sqlite` (default) or `memory`
//! - REPLICA__STORAGE__PATH: SQLite database file
//! - REPLICA_CONFIG: optional YAML config file (consumer tuning, failure policy)
//! - REPLICA_LOG: log filter (default: info)

use std::sync::Arc;

use tracing::{error, info};

use replica_bridge::bus::provisioner::CURSO_TOPICS;
use replica_bridge::bus::{
    ensure_topics, ConsumerPool, ConsumerSpec, FailurePolicy, KafkaConnector, KafkaReaderFactory,
    KafkaWriter, MessageHandler,
};
use replica_bridge::config::{Config, StorageType};
use replica_bridge::dlq::{dlq_topic, BrokerDeadLetterPublisher};
use replica_bridge::event::PESSOA_SAVED;
use replica_bridge::replication::{PersonDto, ReplicationHandler};
use replica_bridge::storage::{open_sqlite, InMemoryPersonRepository, SqlitePersonRepository};
use replica_bridge::utils::bootstrap::{init_tracing, shutdown_signal};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!("Starting curso-replica");

    let brokers = config.kafka.broker_list()?;
    let client_config = config.kafka.client_config()?;
    let settings = config.consumer.settings();

    let mut topics = config.topics_or(CURSO_TOPICS);
    if settings.failure_policy == FailurePolicy::DeadLetter {
        topics.push(dlq_topic(PESSOA_SAVED));
    }
    ensure_topics(&KafkaConnector::new(client_config.clone()), &brokers, &topics).await?;
    info!(topics = ?topics, "Topics ready");

    let handler: Arc<dyn MessageHandler> = match config.storage.storage_type {
        StorageType::Memory => {
            info!("Storage: memory");
            Arc::new(ReplicationHandler::<PersonDto, _>::new(Arc::new(
                InMemoryPersonRepository::new(),
            )))
        }
        StorageType::Sqlite => {
            let repository = SqlitePersonRepository::new(open_sqlite(&config.storage).await?);
            repository.init().await?;
            Arc::new(ReplicationHandler::<PersonDto, _>::new(Arc::new(repository)))
        }
    };

    let mut pool = ConsumerPool::new(
        Arc::new(KafkaReaderFactory::new(client_config.clone())),
        settings,
    );
    if pool.settings().failure_policy == FailurePolicy::DeadLetter {
        let writer = KafkaWriter::new(&client_config)?;
        pool = pool.with_dead_letters(Arc::new(BrokerDeadLetterPublisher::new(Arc::new(writer))));
    }

    info!(brokers = ?brokers, topic = PESSOA_SAVED, "Replica running, press Ctrl+C to exit");

    pool.run(
        vec![ConsumerSpec::new(PESSOA_SAVED, brokers, handler)],
        shutdown_signal(),
    )
    .await
    .map_err(|e| {
        error!(error = %e, "Consumer pool stopped with error");
        e
    })?;

    info!("curso-replica stopped");
    Ok(())
}
