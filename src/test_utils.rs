//! Test utilities and mock implementations.
//!
//! Recording doubles for the handler seams plus a polling helper for
//! asserting on work done by background consumer loops.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::bus::{BusError, HandlerError, Message, MessageHandler, MessageReader, ReaderFactory, ReaderOptions};
use crate::event::{DomainEvent, EventError, EventHandler};

/// How a recording double fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailMode {
    Never,
    /// Fail every call with a retryable error.
    Always,
    /// Fail the first `n` calls with a retryable error.
    FirstN(usize),
    /// Fail every call with a decode error.
    Decode,
}

/// Message handler that records every message it is given.
pub struct RecordingMessageHandler {
    seen: Mutex<Vec<Message>>,
    calls: AtomicUsize,
    fail: FailMode,
}

impl RecordingMessageHandler {
    pub fn new() -> Self {
        Self::failing(FailMode::Never)
    }

    pub fn failing(fail: FailMode) -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            fail,
        }
    }

    /// Messages handled successfully.
    pub async fn seen(&self) -> Vec<Message> {
        self.seen.lock().await.clone()
    }

    /// Every call, successful or not.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for RecordingMessageHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageHandler for RecordingMessageHandler {
    async fn handle(&self, message: &Message) -> Result<(), HandlerError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.fail {
            FailMode::Always => return Err(HandlerError::Other("scripted failure".to_string())),
            FailMode::FirstN(n) if call < n => {
                return Err(HandlerError::Other(format!("scripted failure {}", call + 1)))
            }
            FailMode::Decode => {
                if let Err(e) = serde_json::from_slice::<serde_json::Value>(b"{") {
                    return Err(HandlerError::Decode(e));
                }
            }
            _ => {}
        }
        self.seen.lock().await.push(message.clone());
        Ok(())
    }
}

/// Event handler that appends `"{label}:{event}"` to a shared journal.
pub struct RecordingEventHandler {
    label: String,
    journal: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl RecordingEventHandler {
    pub fn new(label: &str, journal: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            label: label.to_string(),
            journal,
            fail: false,
        }
    }

    /// Records the call, then fails.
    pub fn failing(label: &str, journal: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            fail: true,
            ..Self::new(label, journal)
        }
    }
}

#[async_trait]
impl EventHandler for RecordingEventHandler {
    fn name(&self) -> &str {
        &self.label
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), EventError> {
        self.journal
            .lock()
            .await
            .push(format!("{}:{}", self.label, event.name()));
        if self.fail {
            return Err(EventError::Handler(format!("{} failed", self.label)));
        }
        Ok(())
    }
}

/// Reader factory whose `open` always fails.
pub struct FailingReaderFactory;

impl ReaderFactory for FailingReaderFactory {
    fn open(&self, options: &ReaderOptions) -> crate::bus::Result<Box<dyn MessageReader>> {
        Err(BusError::Connection(format!("dial tcp {}: connection refused", options.broker)))
    }
}

/// Poll `condition` every 10ms until it holds or `timeout` elapses.
pub async fn wait_until<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
