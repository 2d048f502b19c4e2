//! Configuration file support.
//!
//! Loads the connection settings and connector tuning from a TOML file:
//!
//! ```toml
//! address = "fmg.example.com"
//! port = 443
//! auth_method = "API Key"
//! api_key = "..."
//! verify_ssl = false
//!
//! [tuning]
//! lock_max_attempts = 200
//! task_poll_interval_secs = 2
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use fmg_rpc_common::{ConnectorConfig, ConnectorError, ConnectorResult};
use serde::{Deserialize, Serialize};

use crate::lock::{RetryPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_BACKOFF, DEFAULT_MIN_BACKOFF};
use crate::task::{TrackerSettings, DEFAULT_POLL_INTERVAL, DEFAULT_RETRIEVAL_FAIL_GATE};

/// Lock retry and task polling knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TuningConfig {
    /// Maximum lock attempts per request
    #[serde(default = "default_lock_max_attempts")]
    pub lock_max_attempts: u32,

    /// Shortest backoff between lock attempts in milliseconds
    #[serde(default = "default_lock_min_backoff")]
    pub lock_min_backoff_ms: u64,

    /// Longest backoff between lock attempts in milliseconds
    #[serde(default = "default_lock_max_backoff")]
    pub lock_max_backoff_ms: u64,

    /// Delay between task polls in seconds
    #[serde(default = "default_task_poll_interval")]
    pub task_poll_interval_secs: u64,

    /// Consecutive failed task polls tolerated
    #[serde(default = "default_task_retrieval_fail_gate")]
    pub task_retrieval_fail_gate: u32,
}

fn default_lock_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_lock_min_backoff() -> u64 {
    DEFAULT_MIN_BACKOFF.as_millis() as u64
}

fn default_lock_max_backoff() -> u64 {
    DEFAULT_MAX_BACKOFF.as_millis() as u64
}

fn default_task_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL.as_secs()
}

fn default_task_retrieval_fail_gate() -> u32 {
    DEFAULT_RETRIEVAL_FAIL_GATE
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            lock_max_attempts: default_lock_max_attempts(),
            lock_min_backoff_ms: default_lock_min_backoff(),
            lock_max_backoff_ms: default_lock_max_backoff(),
            task_poll_interval_secs: default_task_poll_interval(),
            task_retrieval_fail_gate: default_task_retrieval_fail_gate(),
        }
    }
}

/// Complete connector configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Controller connection
    #[serde(flatten)]
    pub connection: ConnectorConfig,

    /// Retry and polling knobs
    #[serde(default)]
    pub tuning: TuningConfig,
}

impl Settings {
    /// Loads and validates settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> ConnectorResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConnectorError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        let settings = Self::from_toml(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parses settings from TOML text without validating them.
    pub fn from_toml(content: &str) -> ConnectorResult<Self> {
        toml::from_str(content).map_err(|e| ConnectorError::invalid_config("settings", e.to_string()))
    }

    /// Validates the connection and tuning values.
    pub fn validate(&self) -> ConnectorResult<()> {
        self.connection.validate()?;

        if self.tuning.lock_max_attempts == 0 {
            return Err(ConnectorError::invalid_config(
                "tuning.lock_max_attempts",
                "must be at least 1",
            ));
        }
        if self.tuning.lock_min_backoff_ms > self.tuning.lock_max_backoff_ms {
            return Err(ConnectorError::invalid_config(
                "tuning.lock_min_backoff_ms",
                "must not exceed lock_max_backoff_ms",
            ));
        }
        if self.tuning.task_poll_interval_secs == 0 {
            return Err(ConnectorError::invalid_config(
                "tuning.task_poll_interval_secs",
                "must be at least 1",
            ));
        }
        if self.tuning.task_retrieval_fail_gate == 0 {
            return Err(ConnectorError::invalid_config(
                "tuning.task_retrieval_fail_gate",
                "must be at least 1",
            ));
        }

        Ok(())
    }

    /// Lock retry policy from the tuning table.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.tuning.lock_max_attempts,
            Duration::from_millis(self.tuning.lock_min_backoff_ms),
            Duration::from_millis(self.tuning.lock_max_backoff_ms),
        )
    }

    /// Task polling settings from the tuning table.
    pub fn tracker_settings(&self) -> TrackerSettings {
        TrackerSettings {
            poll_interval: Duration::from_secs(self.tuning.task_poll_interval_secs),
            retrieval_fail_gate: self.tuning.task_retrieval_fail_gate,
        }
    }
}
