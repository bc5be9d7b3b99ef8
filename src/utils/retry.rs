//! Retry utilities: backoff builders for the consumer loops.
//!
//! Uses `backon` for exponential backoff with jitter. Handler retries are
//! bounded by the configured failure policy; read-error backoff is unbounded
//! and restarts whenever a read succeeds.

use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};

/// Backoff for retrying a failed message handler.
///
/// `max_attempts` counts retries after the first call.
pub fn handler_backoff(min_delay: Duration, max_delay: Duration, max_attempts: usize) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(min_delay)
        .with_max_delay(max_delay)
        .with_max_times(max_attempts)
        .with_jitter()
}

/// Pause schedule after transient read errors.
///
/// - Min delay: 50ms
/// - Max delay: `max_delay`
/// - Jitter enabled
pub struct ReadBackoff {
    max_delay: Duration,
    current: ExponentialBackoff,
}

impl ReadBackoff {
    pub fn new(max_delay: Duration) -> Self {
        Self {
            max_delay,
            current: Self::builder(max_delay).build(),
        }
    }

    fn builder(max_delay: Duration) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(50).min(max_delay))
            .with_max_delay(max_delay)
            .with_max_times(32)
            .with_jitter()
    }

    /// Delay before the next read attempt. Never exceeds the ceiling.
    pub fn next_delay(&mut self) -> Duration {
        self.current
            .next()
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Start over from the minimum delay.
    pub fn reset(&mut self) {
        self.current = Self::builder(self.max_delay).build();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_backoff_respects_ceiling() {
        let ceiling = Duration::from_millis(200);
        let mut backoff = ReadBackoff::new(ceiling);
        for _ in 0..64 {
            assert!(backoff.next_delay() <= ceiling);
        }
    }

    #[test]
    fn test_read_backoff_zero_ceiling() {
        let mut backoff = ReadBackoff::new(Duration::ZERO);
        assert_eq!(backoff.next_delay(), Duration::ZERO);
    }

    #[test]
    fn test_handler_backoff_is_bounded() {
        let delays: Vec<Duration> =
            handler_backoff(Duration::from_millis(1), Duration::from_millis(4), 3)
                .build()
                .collect();
        assert_eq!(delays.len(), 3);
    }
}
