//! checkgrid.toml configuration parser.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::check::CheckConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckgridConfig {
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub api: ApiConfig,
    /// Static cluster checks scheduled at start-up.
    #[serde(default)]
    pub checks: Vec<CheckConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Seconds of heartbeat silence after which a node is expired.
    #[serde(default = "default_expiration_timeout")]
    pub node_expiration_timeout_secs: u64,
    /// Period of the expiration sweep.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_expiration_timeout() -> u64 {
    30
}

fn default_sweep_interval() -> u64 {
    10
}

fn default_port() -> u16 {
    5005
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            node_expiration_timeout_secs: default_expiration_timeout(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl DispatcherConfig {
    pub fn node_expiration_timeout(&self) -> Duration {
        Duration::from_secs(self.node_expiration_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

impl CheckgridConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Load the file if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: CheckgridConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatcher.node_expiration_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "dispatcher.node_expiration_timeout_secs must be positive".to_string(),
            ));
        }
        if self.dispatcher.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "dispatcher.sweep_interval_secs must be positive".to_string(),
            ));
        }
        if let Some(check) = self.checks.iter().find(|c| c.name.is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "static check with empty name (provider {:?})",
                check.provider
            )));
        }
        Ok(())
    }
}
