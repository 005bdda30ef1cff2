//! Configuration for the consensus engine.
//!
//! Loaded from TOML; every section and field is optional and falls back to the
//! defaults below.
//!
//! ```toml
//! network = "regtest"
//!
//! [rules]
//! ignore_script_errors = true
//!
//! [selector]
//! max_idle_time_ms = 5000
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use consensus_core::config::Params;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Unknown network: {0}")]
    UnknownNetwork(String),
}

/// Switches injected into the consensus rules at construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Accept every block without checking it. Only for replaying trusted data.
    pub bypass_validation: bool,
    /// Log script failures instead of rejecting the block.
    pub ignore_script_errors: bool,
}

/// Scheduling of one reactive worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Run once immediately after start
    pub initial_notify: bool,
    /// Pause after each run before the next one may start
    pub min_idle_time_ms: u64,
    /// Run anyway after this long without a notification
    pub max_idle_time_ms: Option<u64>,
}

impl WorkerConfig {
    pub fn min_idle_time(&self) -> Duration {
        Duration::from_millis(self.min_idle_time_ms)
    }

    pub fn max_idle_time(&self) -> Option<Duration> {
        self.max_idle_time_ms.map(Duration::from_millis)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { initial_notify: true, min_idle_time_ms: 0, max_idle_time_ms: Some(30_000) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// "mainnet" or "regtest"
    pub network: String,
    pub rules: RulesConfig,
    pub selector: WorkerConfig,
    pub transition: WorkerConfig,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            network: "mainnet".to_string(),
            rules: RulesConfig::default(),
            selector: WorkerConfig::default(),
            transition: WorkerConfig::default(),
        }
    }
}

impl ConsensusConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from file if it exists, otherwise use defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Network parameters named by `network`.
    pub fn params(&self) -> Result<Params, ConfigError> {
        match self.network.as_str() {
            "mainnet" => Ok(Params::mainnet()),
            "regtest" => Ok(Params::regtest()),
            other => Err(ConfigError::UnknownNetwork(other.to_string())),
        }
    }
}
