//! Session configuration.
//!
//! Loaded from the `[session]` table of a TOML file or built in code.
//! Every field has a default, so an empty table is a valid configuration.

use floorsync_core::ConflictResolutionStrategy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Tunables for a [`FloorPlanSession`](crate::FloorPlanSession).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds between presence heartbeats (default: 15).
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    /// Seconds without a heartbeat before a peer is dropped (default: 45).
    #[serde(default = "default_presence_timeout_secs")]
    pub presence_timeout_secs: u64,
    /// Seconds before an unconfirmed optimistic add is rolled back (default: 30).
    #[serde(default = "default_pending_timeout_secs")]
    pub pending_timeout_secs: u64,
    /// Conflict policy for the session (default: server_authoritative).
    #[serde(default)]
    pub strategy: ConflictResolutionStrategy,
    /// Name used for this client in logs.
    #[serde(default = "default_device_name")]
    pub device_name: String,
}

fn default_heartbeat_interval_secs() -> u64 {
    15
}

fn default_presence_timeout_secs() -> u64 {
    45 // 3 missed heartbeats
}

fn default_pending_timeout_secs() -> u64 {
    30
}

fn default_device_name() -> String {
    "floorsync client".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            presence_timeout_secs: default_presence_timeout_secs(),
            pending_timeout_secs: default_pending_timeout_secs(),
            strategy: ConflictResolutionStrategy::default(),
            device_name: default_device_name(),
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Set the heartbeat interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval_secs = interval.as_secs().max(1);
        self
    }

    /// Set the presence timeout.
    pub fn with_presence_timeout(mut self, timeout: Duration) -> Self {
        self.presence_timeout_secs = timeout.as_secs();
        self
    }

    /// Set the pending-operation timeout.
    pub fn with_pending_timeout(mut self, timeout: Duration) -> Self {
        self.pending_timeout_secs = timeout.as_secs();
        self
    }

    /// Set the conflict resolution strategy.
    pub fn with_strategy(mut self, strategy: ConflictResolutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the device name.
    pub fn with_device_name(mut self, name: &str) -> Self {
        self.device_name = name.to_string();
        self
    }

    /// Heartbeat period. Never zero.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    /// Presence staleness window.
    pub fn presence_timeout(&self) -> Duration {
        Duration::from_secs(self.presence_timeout_secs)
    }

    /// Pending-operation timeout.
    pub fn pending_timeout(&self) -> Duration {
        Duration::from_secs(self.pending_timeout_secs)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}
