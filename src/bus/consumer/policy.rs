//! Consumer settings and handler failure policy.

use std::time::Duration;

use serde::Deserialize;

/// Default bounded wait for a single read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);
/// Default minimum fetch batch (10 KB).
pub const DEFAULT_MIN_BYTES: usize = 10_000;
/// Default maximum fetch batch (10 MB).
pub const DEFAULT_MAX_BYTES: usize = 10_000_000;

/// Where a freshly opened reader starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartOffset {
    /// Replay the partition from its first retained message.
    #[default]
    Earliest,
    /// Only messages written after the reader opened.
    Latest,
}

/// What a read loop does when the handler returns an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Log the failure and treat the message as consumed (legacy behaviour).
    Ignore,
    /// Stop the loop and surface the error through the pool's join.
    #[default]
    Halt,
    /// Retry retryable failures with exponential backoff, then halt.
    Retry {
        max_attempts: usize,
        min_delay_ms: u64,
        max_delay_ms: u64,
    },
    /// Publish the failed message to `{topic}.dlq` and continue.
    DeadLetter,
}

impl FailurePolicy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ignore => "ignore",
            Self::Halt => "halt",
            Self::Retry { .. } => "retry",
            Self::DeadLetter => "dead_letter",
        }
    }
}

/// Tunables shared by every loop in a pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerSettings {
    pub read_timeout: Duration,
    pub min_bytes: usize,
    pub max_bytes: usize,
    pub start_offset: StartOffset,
    pub failure_policy: FailurePolicy,
    /// Ceiling for the pause after a transient read error.
    pub max_read_backoff: Duration,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
            min_bytes: DEFAULT_MIN_BYTES,
            max_bytes: DEFAULT_MAX_BYTES,
            start_offset: StartOffset::default(),
            failure_policy: FailurePolicy::default(),
            max_read_backoff: Duration::from_secs(5),
        }
    }
}

impl ConsumerSettings {
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_start_offset(mut self, offset: StartOffset) -> Self {
        self.start_offset = offset;
        self
    }

    pub fn with_max_read_backoff(mut self, backoff: Duration) -> Self {
        self.max_read_backoff = backoff;
        self
    }
}
