//! Engine configuration.
//!
//! [`EngineConfig`] is what the engine consumes. [`ConfigFile`] is its
//! persisted INI form, loaded from `<config_dir>/lodstream/config.ini` by
//! default:
//!
//! ```ini
//! [loading]
//! max_concurrent_loads = 16
//! max_attempts = 3
//! request_timeout_secs = 30
//!
//! [memory]
//! budget_mb = 400
//!
//! [traversal]
//! maximum_screen_space_error = 16
//!
//! [logging]
//! directory = /var/log/lodstream
//! level = info
//! ```
//!
//! Missing sections and keys fall back to the defaults below.

mod file;
mod keys;

pub use file::{config_file_path, format_size, ConfigError, ConfigFile};
pub use keys::ConfigKey;

use crate::scheduler::{
    RetryPolicy, SchedulerConfig, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_CONCURRENT_LOADS,
    DEFAULT_REQUEST_TIMEOUT_SECS,
};
use crate::traversal::DEFAULT_MAXIMUM_SCREEN_SPACE_ERROR;
use std::time::Duration;

/// Default resident memory budget shared by all tilesets (400 MiB).
pub const DEFAULT_MEMORY_BUDGET_MB: u64 = 400;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Runtime settings of a [`TilesetEngine`](crate::engine::TilesetEngine).
#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    pub max_concurrent_loads: usize,
    pub retry_policy: RetryPolicy,
    /// `None` disables load timeouts.
    pub request_timeout: Option<Duration>,
    pub memory_budget_bytes: u64,
    /// Pixel error budget applied to views built from this configuration.
    pub maximum_screen_space_error: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_loads: DEFAULT_MAX_CONCURRENT_LOADS,
            retry_policy: RetryPolicy::new(DEFAULT_MAX_ATTEMPTS),
            request_timeout: Some(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)),
            memory_budget_bytes: DEFAULT_MEMORY_BUDGET_MB * BYTES_PER_MB,
            maximum_screen_space_error: DEFAULT_MAXIMUM_SCREEN_SPACE_ERROR,
        }
    }
}

impl EngineConfig {
    pub fn with_max_concurrent_loads(mut self, n: usize) -> Self {
        self.max_concurrent_loads = n;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_memory_budget_bytes(mut self, bytes: u64) -> Self {
        self.memory_budget_bytes = bytes;
        self
    }

    pub fn with_memory_budget_mb(self, mb: u64) -> Self {
        self.with_memory_budget_bytes(mb.saturating_mul(BYTES_PER_MB))
    }

    pub fn with_maximum_screen_space_error(mut self, pixels: f64) -> Self {
        self.maximum_screen_space_error = pixels;
        self
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            max_concurrent_loads: self.max_concurrent_loads,
            retry_policy: self.retry_policy.clone(),
            request_timeout: self.request_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_concurrent_loads, 16);
        assert_eq!(config.retry_policy.max_attempts(), 3);
        assert_eq!(config.memory_budget_bytes, 400 * 1024 * 1024);
        assert_eq!(config.request_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.maximum_screen_space_error, 16.0);
    }

    #[test]
    fn test_scheduler_config_mirrors_engine_config() {
        let config = EngineConfig::default()
            .with_max_concurrent_loads(2)
            .with_request_timeout(None);
        let scheduler = config.scheduler_config();
        assert_eq!(scheduler.max_concurrent_loads, 2);
        assert_eq!(scheduler.request_timeout, None);
        assert_eq!(scheduler.retry_policy, config.retry_policy);
    }

    #[test]
    fn test_budget_mb() {
        let config = EngineConfig::default().with_memory_budget_mb(1);
        assert_eq!(config.memory_budget_bytes, 1_048_576);
    }
}
