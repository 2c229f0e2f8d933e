//! Node configuration and the top-level `tether.toml` format

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_core::config::{env_override_u64, load_toml_file};
use tether_core::{ConfigValidation, TetherError};
use tether_relay::RelayConfig;

/// Overrides `node.grace_period_ms`
pub const ENV_GRACE_PERIOD_MS: &str = "TETHER_GRACE_PERIOD_MS";
/// Overrides `relay.timeouts.handshake_ms`
pub const ENV_HANDSHAKE_TIMEOUT_MS: &str = "TETHER_HANDSHAKE_TIMEOUT_MS";
/// Overrides `relay.timeouts.whitelist_ms`
pub const ENV_WHITELIST_TIMEOUT_MS: &str = "TETHER_WHITELIST_TIMEOUT_MS";

/// `[node]` section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Pause after closing the transport so deferred socket closes can run.
    /// Zero skips the pause.
    pub grace_period_ms: u64,
    /// How long stop waits for each queue worker before aborting it
    pub worker_join_timeout_ms: u64,
    /// Capacity of each work queue
    pub queue_capacity: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: 250,
            worker_join_timeout_ms: 1_000,
            queue_capacity: 1_024,
        }
    }
}

impl NodeConfig {
    /// Pause after the transport closes
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    /// How long each worker gets to exit before it is aborted
    pub fn worker_join_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_join_timeout_ms)
    }
}

impl ConfigValidation for NodeConfig {
    fn validate(&self) -> Result<(), TetherError> {
        if self.worker_join_timeout_ms == 0 {
            return Err(TetherError::config("node.worker_join_timeout_ms must be non-zero"));
        }
        if self.queue_capacity == 0 {
            return Err(TetherError::config("node.queue_capacity must be non-zero"));
        }
        Ok(())
    }
}

/// Whole configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TetherConfig {
    /// `[node]` section
    #[serde(default)]
    pub node: NodeConfig,
    /// `[relay]` section
    #[serde(default)]
    pub relay: RelayConfig,
}

impl TetherConfig {
    /// Load a file, apply environment overrides, then validate the result.
    pub fn load(path: &Path) -> Result<Self, TetherError> {
        let config: Self = load_toml_file(path)?;
        let config = config.merge_with_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `TETHER_*` environment overrides
    pub fn merge_with_env(mut self) -> Result<Self, TetherError> {
        env_override_u64(ENV_GRACE_PERIOD_MS, &mut self.node.grace_period_ms)?;
        env_override_u64(ENV_HANDSHAKE_TIMEOUT_MS, &mut self.relay.timeouts.handshake_ms)?;
        env_override_u64(ENV_WHITELIST_TIMEOUT_MS, &mut self.relay.timeouts.whitelist_ms)?;
        Ok(self)
    }
}

impl ConfigValidation for TetherConfig {
    fn validate(&self) -> Result<(), TetherError> {
        self.node.validate()?;
        self.relay.validate()
    }
}
