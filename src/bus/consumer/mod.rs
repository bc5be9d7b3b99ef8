//! Consumer pool: one read loop per (topic, broker) pair.
//!
//! Every loop owns one reader bound to one broker, topic and partition. Loops
//! share a cancellation token; the pool handle is the supervisor that cancels
//! the rest when one loop fails and joins them all.
//!
//! ```text
//! Connecting -> Reading <-> (Timeout | ReadError) -> Reading -> Stopped
//! ```

mod policy;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backon::Retryable;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{BusError, Message, ReaderFactory, ReaderOptions};
use crate::dlq::{DeadLetter, DeadLetterPublisher, DlqError};
use crate::storage::StorageError;
use crate::utils::retry::{handler_backoff, ReadBackoff};

pub use policy::{
    ConsumerSettings, FailurePolicy, StartOffset, DEFAULT_MAX_BYTES, DEFAULT_MIN_BYTES,
    DEFAULT_READ_TIMEOUT,
};

// ============================================================================
// Handler contract
// ============================================================================

/// Errors returned by message handlers.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Failed to decode message payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Repository error: {0}")]
    Repository(#[from] StorageError),

    #[error("Handler failed: {0}")]
    Other(String),
}

impl HandlerError {
    /// Decode errors never succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Decode(_) => false,
            Self::Repository(e) => e.is_retryable(),
            Self::Other(_) => true,
        }
    }
}

/// Processes one raw message read from a topic.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &Message) -> Result<(), HandlerError>;
}

/// What to consume and who processes it.
///
/// Fans out into one read loop per broker address.
#[derive(Clone)]
pub struct ConsumerSpec {
    pub topic: String,
    pub partition: i32,
    pub brokers: Vec<String>,
    pub handler: Arc<dyn MessageHandler>,
}

impl ConsumerSpec {
    pub fn new(
        topic: impl Into<String>,
        brokers: Vec<String>,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition: 0,
            brokers,
            handler,
        }
    }

    pub fn with_partition(mut self, partition: i32) -> Self {
        self.partition = partition;
        self
    }
}

impl std::fmt::Debug for ConsumerSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerSpec")
            .field("topic", &self.topic)
            .field("partition", &self.partition)
            .field("brokers", &self.brokers)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors that end a read loop (and with it, the pool).
#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error("Consumer configuration error: {0}")]
    Config(String),

    #[error("Failed to open reader for '{topic}' on {broker}: {source}")]
    Open {
        topic: String,
        broker: String,
        #[source]
        source: BusError,
    },

    #[error("Handler failed for '{topic}' on {broker} at offset {offset}: {source}")]
    Handler {
        topic: String,
        broker: String,
        offset: i64,
        #[source]
        source: HandlerError,
    },

    #[error("Failed to dead-letter '{topic}' offset {offset}: {source}")]
    DeadLetter {
        topic: String,
        offset: i64,
        #[source]
        source: DlqError,
    },

    #[error("Consumer task failed: {0}")]
    Join(String),
}

// ============================================================================
// Pool
// ============================================================================

/// Launches and supervises read loops.
pub struct ConsumerPool {
    factory: Arc<dyn ReaderFactory>,
    settings: ConsumerSettings,
    dead_letters: Option<Arc<dyn DeadLetterPublisher>>,
}

impl ConsumerPool {
    pub fn new(factory: Arc<dyn ReaderFactory>, settings: ConsumerSettings) -> Self {
        Self {
            factory,
            settings,
            dead_letters: None,
        }
    }

    /// Destination for messages whose handler failed under `FailurePolicy::DeadLetter`.
    pub fn with_dead_letters(mut self, publisher: Arc<dyn DeadLetterPublisher>) -> Self {
        self.dead_letters = Some(publisher);
        self
    }

    pub fn settings(&self) -> &ConsumerSettings {
        &self.settings
    }

    /// Spawn one loop per (spec, broker) and return the supervising handle.
    pub fn start(&self, specs: Vec<ConsumerSpec>) -> Result<PoolHandle, ConsumerError> {
        self.validate(&specs)?;

        let token = CancellationToken::new();
        let mut tasks = JoinSet::new();

        for spec in &specs {
            for broker in &spec.brokers {
                let read_loop = ReadLoop {
                    options: ReaderOptions {
                        broker: broker.clone(),
                        topic: spec.topic.clone(),
                        partition: spec.partition,
                        min_bytes: self.settings.min_bytes,
                        max_bytes: self.settings.max_bytes,
                        start_offset: self.settings.start_offset,
                    },
                    handler: spec.handler.clone(),
                    factory: self.factory.clone(),
                    settings: self.settings.clone(),
                    dead_letters: self.dead_letters.clone(),
                    token: token.clone(),
                };

                // Cancels the pool unless the loop returns Ok, panics included.
                let supervisor = token.clone().drop_guard();
                tasks.spawn(async move {
                    let result = read_loop.run().await;
                    if result.is_ok() {
                        supervisor.disarm();
                    }
                    result
                });
            }
        }

        let loops = tasks.len();
        info!(
            loops = loops,
            policy = self.settings.failure_policy.name(),
            "Consumer pool started"
        );

        Ok(PoolHandle { token, tasks })
    }

    /// Start, run until `shutdown` resolves or a loop fails, then join.
    pub async fn run<F>(&self, specs: Vec<ConsumerSpec>, shutdown: F) -> Result<(), ConsumerError>
    where
        F: Future<Output = ()>,
    {
        self.start(specs)?.run_until(shutdown).await
    }

    fn validate(&self, specs: &[ConsumerSpec]) -> Result<(), ConsumerError> {
        if self.settings.failure_policy == FailurePolicy::DeadLetter && self.dead_letters.is_none() {
            return Err(ConsumerError::Config(
                "dead_letter failure policy requires a dead-letter publisher".to_string(),
            ));
        }
        for spec in specs {
            if spec.topic.trim().is_empty() {
                return Err(ConsumerError::Config("consumer topic must be specified".to_string()));
            }
            if spec.brokers.is_empty() || spec.brokers.iter().any(|b| b.trim().is_empty()) {
                return Err(ConsumerError::Config(format!(
                    "consumer for '{}' has an empty broker address",
                    spec.topic
                )));
            }
        }
        Ok(())
    }
}

/// Supervises the loops of a started pool.
pub struct PoolHandle {
    token: CancellationToken,
    tasks: JoinSet<Result<(), ConsumerError>>,
}

impl PoolHandle {
    /// Number of loops still tracked by the handle.
    pub fn loop_count(&self) -> usize {
        self.tasks.len()
    }

    /// Token observed by every loop; cancelling it stops the pool.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Ask every loop to stop. Use [`PoolHandle::join`] to wait for them.
    pub fn shutdown(&self) {
        info!("Consumer pool shutting down");
        self.token.cancel();
    }

    /// Wait for every loop to exit.
    ///
    /// The first loop error cancels the remaining loops and is returned.
    pub async fn join(mut self) -> Result<(), ConsumerError> {
        let mut first_error = None;

        while let Some(joined) = self.tasks.join_next().await {
            let outcome = joined.unwrap_or_else(|e| Err(ConsumerError::Join(e.to_string())));
            if let Err(e) = outcome {
                self.token.cancel();
                if first_error.is_none() {
                    error!(error = %e, "Consumer loop failed");
                    first_error = Some(e);
                } else {
                    warn!(error = %e, "Additional consumer loop failure");
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Wait for `shutdown` (or a loop failure), cancel, then join.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ConsumerError>
    where
        F: Future<Output = ()>,
    {
        let token = self.token.clone();
        tokio::select! {
            _ = shutdown => self.shutdown(),
            _ = token.cancelled() => {}
        }
        self.join().await
    }
}

// ============================================================================
// Read loop
// ============================================================================

struct ReadLoop {
    options: ReaderOptions,
    handler: Arc<dyn MessageHandler>,
    factory: Arc<dyn ReaderFactory>,
    settings: ConsumerSettings,
    dead_letters: Option<Arc<dyn DeadLetterPublisher>>,
    token: CancellationToken,
}

impl ReadLoop {
    async fn run(self) -> Result<(), ConsumerError> {
        let topic = self.options.topic.clone();
        let broker = self.options.broker.clone();

        debug!(topic = %topic, broker = %broker, state = "connecting", "Opening reader");
        let mut reader = self
            .factory
            .open(&self.options)
            .map_err(|source| ConsumerError::Open {
                topic: topic.clone(),
                broker: broker.clone(),
                source,
            })?;

        info!(
            topic = %topic,
            broker = %broker,
            partition = self.options.partition,
            state = "reading",
            "Consumer loop started"
        );

        let mut backoff = ReadBackoff::new(self.settings.max_read_backoff);

        loop {
            // The timeout lives only for this iteration.
            let read = tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                read = tokio::time::timeout(self.settings.read_timeout, reader.read()) => read,
            };

            match read {
                Err(_) => {
                    debug!(
                        topic = %topic,
                        broker = %broker,
                        error = %BusError::Timeout(self.settings.read_timeout),
                        "No message before deadline, reading again"
                    );
                }
                Ok(Err(e)) => {
                    let delay = backoff.next_delay();
                    if e.is_transient() {
                        warn!(topic = %topic, broker = %broker, error = %e, retry_in = ?delay, "Read failed");
                    } else {
                        error!(topic = %topic, broker = %broker, error = %e, retry_in = ?delay, "Read failed");
                    }
                    if self.pause(delay).await {
                        break;
                    }
                }
                Ok(Ok(message)) => {
                    backoff.reset();
                    self.process(message).await?;
                }
            }
        }

        info!(topic = %topic, broker = %broker, state = "stopped", "Consumer loop stopped");
        Ok(())
    }

    /// Sleep unless cancelled first. Returns true when cancelled.
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => true,
            _ = tokio::time::sleep(delay) => false,
        }
    }

    async fn process(&self, message: Message) -> Result<(), ConsumerError> {
        let (result, attempts) = self.invoke(&message).await;

        let error = match result {
            Ok(()) => {
                debug!(
                    topic = %message.topic,
                    offset = message.offset,
                    key = %message.key_str(),
                    "Message processed"
                );
                return Ok(());
            }
            Err(e) => e,
        };

        match &self.settings.failure_policy {
            FailurePolicy::Ignore => {
                warn!(
                    topic = %message.topic,
                    offset = message.offset,
                    error = %error,
                    "Handler failed, message considered consumed"
                );
                Ok(())
            }
            FailurePolicy::Halt | FailurePolicy::Retry { .. } => {
                error!(
                    topic = %message.topic,
                    offset = message.offset,
                    attempts = attempts,
                    error = %error,
                    "Handler failed, halting consumer loop"
                );
                Err(ConsumerError::Handler {
                    topic: message.topic.clone(),
                    broker: self.options.broker.clone(),
                    offset: message.offset,
                    source: error,
                })
            }
            FailurePolicy::DeadLetter => {
                let publisher = self.dead_letters.as_ref().ok_or_else(|| {
                    ConsumerError::Config("no dead-letter publisher configured".to_string())
                })?;
                publisher
                    .publish(DeadLetter::from_message(&message, &error, attempts))
                    .await
                    .map_err(|source| ConsumerError::DeadLetter {
                        topic: message.topic.clone(),
                        offset: message.offset,
                        source,
                    })
            }
        }
    }

    /// Call the handler, retrying under `FailurePolicy::Retry`.
    async fn invoke(&self, message: &Message) -> (Result<(), HandlerError>, u32) {
        let FailurePolicy::Retry {
            max_attempts,
            min_delay_ms,
            max_delay_ms,
        } = self.settings.failure_policy
        else {
            return (self.handler.handle(message).await, 1);
        };

        let handler = &self.handler;
        let mut attempts = 0u32;
        let result = (|| {
            attempts += 1;
            async move { handler.handle(message).await }
        })
        .retry(handler_backoff(
            Duration::from_millis(min_delay_ms),
            Duration::from_millis(max_delay_ms),
            max_attempts,
        ))
        .when(|e: &HandlerError| e.is_retryable())
        .notify(|e: &HandlerError, delay: Duration| {
            warn!(
                topic = %message.topic,
                offset = message.offset,
                error = %e,
                retry_in = ?delay,
                "Handler failed, retrying"
            );
        })
        .await;

        (result, attempts)
    }
}
