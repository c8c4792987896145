use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::db::RetryPolicy;

/// Engine configuration. Every field has a serviceable default, so an
/// empty JSON object is a valid config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database file location. `None` falls back to the per-user default.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Active-request capacity per maintenance designee, used for
    /// workload percentages.
    #[serde(default = "default_workload_capacity")]
    pub workload_capacity: u32,
}

fn default_workload_capacity() -> u32 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            retry: RetryConfig::default(),
            workload_capacity: default_workload_capacity(),
        }
    }
}

/// Backoff settings for the retry-on-busy policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
}

fn default_max_retries() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    100
}

fn default_max_jitter_ms() -> u64 {
    100
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_jitter_ms: default_max_jitter_ms(),
        }
    }
}

impl RetryConfig {
    /// The runtime policy for these settings.
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_jitter: Duration::from_millis(self.max_jitter_ms),
        }
    }
}
