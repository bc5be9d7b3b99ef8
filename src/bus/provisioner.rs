//! Idempotent topic provisioning.
//!
//! Runs once at startup, before any producer or consumer is built. Topics are
//! always created with one partition and replication factor one; an existing
//! topic counts as success.

use tracing::{debug, info, warn};

use super::{AdminConnection, BrokerConnector, BusError};

/// Partition count for provisioned topics.
pub const DEFAULT_PARTITIONS: i32 = 1;
/// Replication factor for provisioned topics.
pub const DEFAULT_REPLICATION_FACTOR: i32 = 1;

/// Topics owned by the people service.
pub const PESSOA_TOPICS: &[&str] = &["pessoa.saved", "pessoa.deleted"];

/// Topics the course service publishes or consumes.
pub const CURSO_TOPICS: &[&str] = &[
    "curso.saved",
    "curso.deleted",
    "pessoa.saved",
    "pessoa.deleted",
    "aluno.saved",
    "aluno.deleted",
    "modulo.saved",
    "modulo.deleted",
];

/// A topic to ensure on the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSpec {
    pub name: String,
    pub partitions: i32,
    pub replication_factor: i32,
}

impl TopicSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partitions: DEFAULT_PARTITIONS,
            replication_factor: DEFAULT_REPLICATION_FACTOR,
        }
    }
}

/// Errors returned by [`ensure_topics`].
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No broker reachable: {0}")]
    Unreachable(#[source] BusError),

    #[error("Controller lookup failed: {0}")]
    Controller(#[source] BusError),

    #[error("Failed to create topic '{topic}': {source}")]
    CreateTopic {
        topic: String,
        #[source]
        source: BusError,
    },
}

/// Ensure every topic in `topics` exists.
///
/// Dials the brokers in order until one answers, asks it for the controller,
/// redials the controller and issues one create per topic. Any failure other
/// than "already exists" aborts the call.
pub async fn ensure_topics<B: AsRef<str>, T: AsRef<str>>(
    connector: &dyn BrokerConnector,
    brokers: &[B],
    topics: &[T],
) -> Result<(), ProvisionError> {
    if brokers.is_empty() {
        return Err(ProvisionError::Config("no broker addresses configured".to_string()));
    }
    if brokers.iter().any(|b| b.as_ref().trim().is_empty()) {
        return Err(ProvisionError::Config("empty broker address".to_string()));
    }

    let seed = dial_any(connector, brokers).await?;
    let controller = seed.controller().await.map_err(ProvisionError::Controller)?;
    drop(seed);

    debug!(controller = %controller, "Resolved cluster controller");

    let conn = connector
        .dial(&controller)
        .await
        .map_err(ProvisionError::Unreachable)?;

    for name in topics {
        let spec = TopicSpec::new(name.as_ref());
        match conn.create_topic(&spec).await {
            Ok(()) => info!(topic = %spec.name, "Topic created"),
            Err(BusError::TopicAlreadyExists(_)) => info!(topic = %spec.name, "Topic already exists"),
            Err(e) => {
                return Err(ProvisionError::CreateTopic {
                    topic: spec.name,
                    source: e,
                })
            }
        }
    }

    Ok(())
}

async fn dial_any<S: AsRef<str>>(
    connector: &dyn BrokerConnector,
    brokers: &[S],
) -> Result<Box<dyn AdminConnection>, ProvisionError> {
    let mut last_error = None;

    for broker in brokers {
        let address = broker.as_ref().trim();
        match connector.dial(address).await {
            Ok(conn) => return Ok(conn),
            Err(e) => {
                warn!(broker = %address, error = %e, "Broker unreachable, trying next");
                last_error = Some(e);
            }
        }
    }

    Err(ProvisionError::Unreachable(last_error.unwrap_or_else(|| {
        BusError::Connection("no broker addresses configured".to_string())
    })))
}
