//! In-memory broker for standalone mode and tests.
//!
//! Implements every transport seam (admin, writer, reader) over shared
//! in-process partition logs. Topics are auto-created on first write, the
//! way a default Kafka broker behaves.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Notify, RwLock};
use tracing::debug;

use super::provisioner::TopicSpec;
use super::{
    AdminConnection, BrokerConnector, BusError, Message, MessageReader, MessageWriter,
    ReaderFactory, ReaderOptions, Result, StartOffset,
};

/// Default broker address served by [`MemoryBroker::new`].
pub const DEFAULT_MEMORY_BROKER: &str = "memory:9092";

#[derive(Default)]
struct TopicLog {
    partitions: Vec<Vec<Message>>,
}

impl TopicLog {
    fn with_partitions(count: i32) -> Self {
        let count = count.max(1) as usize;
        Self {
            partitions: vec![Vec::new(); count],
        }
    }
}

#[derive(Default)]
struct Inner {
    topics: RwLock<HashMap<String, TopicLog>>,
    brokers: RwLock<HashSet<String>>,
    controller: RwLock<String>,
    notify: Notify,
    fail_writes: AtomicBool,
    admin_failure: RwLock<Option<String>>,
    dials: AtomicUsize,
    writes: AtomicUsize,
}

/// Shared in-memory broker cluster.
///
/// Cloning is cheap; clones observe the same topics.
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    /// Create a cluster answering on [`DEFAULT_MEMORY_BROKER`].
    pub fn new() -> Self {
        Self::with_brokers([DEFAULT_MEMORY_BROKER])
    }

    /// Create a cluster answering on the given addresses. The first one is
    /// the controller.
    pub fn with_brokers<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let addresses: Vec<String> = addresses.into_iter().map(Into::into).collect();
        let controller = addresses.first().cloned().unwrap_or_default();
        let inner = Inner {
            brokers: RwLock::new(addresses.into_iter().collect()),
            controller: RwLock::new(controller),
            ..Default::default()
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Take a broker offline or bring it back.
    pub async fn set_broker_online(&self, address: &str, online: bool) {
        let mut brokers = self.inner.brokers.write().await;
        if online {
            brokers.insert(address.to_string());
        } else {
            brokers.remove(address);
        }
    }

    /// Make every subsequent write fail until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent topic creation fail with the given message.
    pub async fn set_admin_failure(&self, message: Option<String>) {
        *self.inner.admin_failure.write().await = message;
    }

    /// Number of admin dials performed so far.
    pub fn dial_count(&self) -> usize {
        self.inner.dials.load(Ordering::SeqCst)
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.inner.writes.load(Ordering::SeqCst)
    }

    pub async fn topic_exists(&self, topic: &str) -> bool {
        self.inner.topics.read().await.contains_key(topic)
    }

    /// Snapshot of every message on partition 0 of `topic`.
    pub async fn messages(&self, topic: &str) -> Vec<Message> {
        self.inner
            .topics
            .read()
            .await
            .get(topic)
            .and_then(|log| log.partitions.first().cloned())
            .unwrap_or_default()
    }

    /// A writer bound to this cluster.
    pub fn writer(&self) -> MemoryWriter {
        MemoryWriter {
            inner: self.inner.clone(),
            closed: AtomicBool::new(false),
        }
    }

    async fn is_online(&self, address: &str) -> bool {
        self.inner.brokers.read().await.contains(address)
    }
}

// ============================================================================
// Admin
// ============================================================================

#[async_trait]
impl BrokerConnector for MemoryBroker {
    async fn dial(&self, address: &str) -> Result<Box<dyn AdminConnection>> {
        self.inner.dials.fetch_add(1, Ordering::SeqCst);
        if !self.is_online(address).await {
            return Err(BusError::Connection(format!("dial tcp {}: connection refused", address)));
        }
        Ok(Box::new(MemoryAdmin {
            inner: self.inner.clone(),
        }))
    }
}

struct MemoryAdmin {
    inner: Arc<Inner>,
}

#[async_trait]
impl AdminConnection for MemoryAdmin {
    async fn controller(&self) -> Result<String> {
        Ok(self.inner.controller.read().await.clone())
    }

    async fn create_topic(&self, topic: &TopicSpec) -> Result<()> {
        if let Some(message) = self.inner.admin_failure.read().await.clone() {
            return Err(BusError::Admin(message));
        }

        let mut topics = self.inner.topics.write().await;
        if topics.contains_key(&topic.name) {
            return Err(BusError::TopicAlreadyExists(topic.name.clone()));
        }
        topics.insert(topic.name.clone(), TopicLog::with_partitions(topic.partitions));
        Ok(())
    }
}

// ============================================================================
// Writer
// ============================================================================

/// Appends messages to the in-memory partition logs.
pub struct MemoryWriter {
    inner: Arc<Inner>,
    closed: AtomicBool,
}

#[async_trait]
impl MessageWriter for MemoryWriter {
    async fn write(&self, mut message: Message) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(BusError::Publish("write to memory broker rejected".to_string()));
        }

        {
            let mut topics = self.inner.topics.write().await;
            let log = topics
                .entry(message.topic.clone())
                .or_insert_with(|| TopicLog::with_partitions(1));
            let partition = message.partition.max(0) as usize;
            let slot = log
                .partitions
                .get_mut(partition)
                .ok_or_else(|| BusError::Publish(format!("partition {} does not exist", partition)))?;
            message.offset = slot.len() as i64;
            debug!(topic = %message.topic, offset = message.offset, "Appended message");
            slot.push(message);
        }

        self.inner.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Reader
// ============================================================================

impl ReaderFactory for MemoryBroker {
    fn open(&self, options: &ReaderOptions) -> Result<Box<dyn MessageReader>> {
        Ok(Box::new(MemoryReader {
            broker: self.clone(),
            options: options.clone(),
            next_offset: None,
        }))
    }
}

struct MemoryReader {
    broker: MemoryBroker,
    options: ReaderOptions,
    next_offset: Option<usize>,
}

impl MemoryReader {
    async fn try_next(&mut self) -> Result<Option<Message>> {
        if !self.broker.is_online(&self.options.broker).await {
            return Err(BusError::Read(format!(
                "broker {} unavailable",
                self.options.broker
            )));
        }

        let topics = self.broker.inner.topics.read().await;
        let log = topics
            .get(&self.options.topic)
            .and_then(|log| log.partitions.get(self.options.partition.max(0) as usize));

        let Some(log) = log else {
            return Ok(None);
        };

        let offset = *self.next_offset.get_or_insert(match self.options.start_offset {
            StartOffset::Earliest => 0,
            StartOffset::Latest => log.len(),
        });

        match log.get(offset) {
            Some(message) => {
                self.next_offset = Some(offset + 1);
                Ok(Some(message.clone()))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl MessageReader for MemoryReader {
    async fn read(&mut self) -> Result<Message> {
        let inner = self.broker.inner.clone();
        loop {
            let notified = inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(message) = self.try_next().await? {
                return Ok(message);
            }

            notified.await;
        }
    }
}

#[cfg(test)]
mod tests;
