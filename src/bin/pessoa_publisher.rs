//! pessoa-publisher: owning side of the people replication.
//!
//! Provisions the people topics, registers the log-only and publishing
//! handlers on `pessoa.saved`, then dispatches one event per JSON person
//! record read from stdin (one object per line).
//!
//! ## Architecture
//! ```text
//! [stdin] -> [EventDispatcher] -> [PublishingHandler] -> [Kafka: pessoa.saved]
//!                  |
//!                  v
//!           [LogOnlyHandler]
//! ```
//!
//! ## Configuration
//! - KAFKA_BROKERS / REPLICA__KAFKA__BROKERS: comma-separated broker list
//! - REPLICA_CONFIG: optional YAML config file
//! - REPLICA_LOG: log filter (default: info)

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use replica_bridge::bus::provisioner::PESSOA_TOPICS;
use replica_bridge::bus::{ensure_topics, KafkaConnector, Producer};
use replica_bridge::config::Config;
use replica_bridge::event::{
    DomainEvent, EventDispatcher, LogOnlyHandler, PublishingHandler, PESSOA_SAVED,
};
use replica_bridge::replication::PersonDto;
use replica_bridge::utils::bootstrap::{init_tracing, shutdown_signal};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!("Starting pessoa-publisher");

    let brokers = config.kafka.broker_list()?;
    let client_config = config.kafka.client_config()?;

    let topics = config.topics_or(PESSOA_TOPICS);
    ensure_topics(&KafkaConnector::new(client_config.clone()), &brokers, &topics).await?;
    info!(topics = ?topics, "Topics ready");

    let producer = Arc::new(Producer::connect(&client_config, PESSOA_SAVED)?);

    let mut builder = EventDispatcher::builder().with_mode(config.dispatcher.mode);
    builder
        .register(
            PESSOA_SAVED,
            Arc::new(LogOnlyHandler::new("INICIALIZANDO EVENTO PESSOA CHANGED")),
        )?
        .register(PESSOA_SAVED, Arc::new(PublishingHandler::new(producer.clone())))?;
    let dispatcher = builder.build();

    info!("Reading person records from stdin, press Ctrl+C to exit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        let line = tokio::select! {
            _ = &mut shutdown => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            info!("End of input");
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let person: PersonDto = match serde_json::from_str(&line) {
            Ok(person) => person,
            Err(e) => {
                warn!(error = %e, "Skipping malformed person record");
                continue;
            }
        };

        let event = DomainEvent::new(PESSOA_SAVED, &person)?.with_key(person.id.as_str());
        if let Err(e) = dispatcher.dispatch(&event).await {
            error!(id = %person.id, error = %e, "Dispatch failed");
        }
    }

    producer.close().await?;
    info!("pessoa-publisher stopped");
    Ok(())
}
