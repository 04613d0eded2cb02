//! Retry policy: bounded attempts with backoff.
//!
//! Used for task-lock acquisition and release. Delivery failures are never retried
//! in-process; the watchdog re-drives them later.

use std::time::Duration;

/// Bounded retry policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Zero is treated as one.
    pub max_attempts: u32,

    /// Delay after the first failed attempt.
    pub base_delay: Duration,

    /// Backoff multiplier. 1.0 gives a fixed delay.
    pub multiplier: f64,
}

impl RetryPolicy {
    /// Same delay between every attempt.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            multiplier: 1.0,
        }
    }

    /// Lock acquisition: a handful of short, growing waits.
    pub fn lock_acquire() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
            multiplier: 2.0,
        }
    }

    /// Lock release: 10 tries, one second apart.
    pub fn lock_release() -> Self {
        Self::fixed(10, Duration::from_millis(1000))
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay before the next try, after `attempts` failed tries (1-indexed).
    ///
    /// delay = base_delay * multiplier^(attempts - 1)
    ///
    /// Example with base_delay=200ms, multiplier=2.0:
    /// - after attempt 1: 200ms
    /// - after attempt 2: 400ms
    /// - after attempt 3: 800ms
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let base_secs = self.base_delay.as_secs_f64();
        let delay_secs = base_secs * self.multiplier.powi(attempts.saturating_sub(1) as i32);
        Duration::from_secs_f64(delay_secs)
    }
}
