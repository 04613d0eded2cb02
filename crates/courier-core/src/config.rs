//! Layered publisher configuration.
//!
//! Sources, later wins:
//! 1. built-in defaults
//! 2. an optional TOML / JSON file
//! 3. `COURIER__`-prefixed environment variables (`COURIER__LOCK__RELEASE_ATTEMPTS=3`)

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::locking::LockSettings;
use crate::app::retry::RetryPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Task lock timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub acquire_attempts: u32,
    pub acquire_backoff_ms: u64,
    pub acquire_multiplier: f64,
    pub release_attempts: u32,
    pub release_backoff_ms: u64,
    /// Lease length. Holders renew after a third of it has elapsed.
    pub ttl_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            acquire_attempts: 5,
            acquire_backoff_ms: 200,
            acquire_multiplier: 2.0,
            release_attempts: 10,
            release_backoff_ms: 1000,
            ttl_secs: 60,
        }
    }
}

impl LockConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn renew_after(&self) -> Duration {
        self.ttl() / 3
    }

    pub fn acquire_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.acquire_attempts,
            base_delay: Duration::from_millis(self.acquire_backoff_ms),
            multiplier: self.acquire_multiplier,
        }
    }

    pub fn release_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.release_attempts,
            Duration::from_millis(self.release_backoff_ms),
        )
    }

    pub fn settings(&self) -> LockSettings {
        LockSettings {
            acquire: self.acquire_policy(),
            release: self.release_policy(),
            renew_after: self.renew_after(),
        }
    }
}

/// Watchdog sweep timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub interval_secs: u64,
    /// Only cursors untouched for this long are swept.
    pub publishing_delay_secs: u64,
    /// Wait before a `Paused` destination is retried.
    pub paused_backoff_secs: u64,
    /// Wait before an `ActivePause` destination is retried.
    pub active_pause_backoff_secs: u64,
    pub max_batches_per_sweep: u32,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            publishing_delay_secs: 5,
            paused_backoff_secs: 445,
            active_pause_backoff_secs: 60,
            max_batches_per_sweep: 10,
        }
    }
}

impl SweepConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn publishing_delay(&self) -> Duration {
        Duration::from_secs(self.publishing_delay_secs)
    }

    pub fn paused_backoff(&self) -> Duration {
        Duration::from_secs(self.paused_backoff_secs)
    }

    pub fn active_pause_backoff(&self) -> Duration {
        Duration::from_secs(self.active_pause_backoff_secs)
    }
}

/// Submission page sizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Page size for request-driven passes (new-submission fan-out).
    pub foreground_limit: usize,
    /// Background (watchdog) passes use `foreground_limit * background_multiplier`.
    pub background_multiplier: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            foreground_limit: 10,
            background_multiplier: 10,
        }
    }
}

impl BatchConfig {
    pub fn limit(&self, background: bool) -> usize {
        if background {
            self.foreground_limit * self.background_multiplier
        } else {
            self.foreground_limit
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    pub lock: LockConfig,
    pub sweep: SweepConfig,
    pub batch: BatchConfig,
}

impl PublisherConfig {
    /// Defaults, then `path` if it exists, then `COURIER__*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let loaded: PublisherConfig = builder
            .add_source(
                config::Environment::with_prefix("COURIER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lock.ttl_secs == 0 {
            return Err(ConfigError::Invalid("lock.ttl_secs must be greater than 0".into()));
        }
        if self.batch.foreground_limit == 0 || self.batch.background_multiplier == 0 {
            return Err(ConfigError::Invalid(
                "batch limits must be greater than 0".into(),
            ));
        }
        if self.sweep.max_batches_per_sweep == 0 {
            return Err(ConfigError::Invalid(
                "sweep.max_batches_per_sweep must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
