//! Source configuration

use crate::backoff::BackoffConfig;
use crate::connection::ConnectionOptions;
use crate::error::{SourceError, SourceResult};
use crate::geometry::BlockGeometry;
use crate::resolver::Role;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use std::time::Duration;

/// Everything needed to construct a [`TcpSource`](crate::TcpSource)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Bytes per item
    pub item_size: usize,
    /// Items per transfer unit
    #[serde(default = "default_vector_length")]
    pub vector_length: usize,
    /// Remote host (client role); ignored by servers
    #[serde(default)]
    pub host: String,
    /// Port number, either as a TOML integer or string
    #[serde(deserialize_with = "deserialize_port")]
    pub port: String,
    /// Client or server
    pub role: Role,
    /// Read timeout / accept polling period in milliseconds; 0 blocks indefinitely
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Per-attempt connect timeout in milliseconds; 0 leaves it to the OS
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Retry pacing between failed connection attempts
    #[serde(default)]
    pub backoff: BackoffSettings,
}

fn default_vector_length() -> usize {
    1
}

fn default_poll_interval_ms() -> u64 {
    200
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

/// Backoff section of the configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffSettings {
    /// Delay after the first failure
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Upper bound on any single delay
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Growth factor per consecutive failure
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Random jitter as a fraction of the delay
    #[serde(default = "default_jitter")]
    pub jitter: f64,
    /// Give up after this many consecutive failures; unset retries forever
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

fn default_initial_delay_ms() -> u64 {
    50
}

fn default_max_delay_ms() -> u64 {
    2_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.1
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
            max_attempts: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PortValue {
    Number(u16),
    Text(String),
}

fn deserialize_port<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match PortValue::deserialize(deserializer)? {
        PortValue::Number(n) => n.to_string(),
        PortValue::Text(s) => s,
    })
}

impl SourceConfig {
    /// Configuration with default timing for the given geometry and peer
    pub fn new(
        item_size: usize,
        vector_length: usize,
        host: impl Into<String>,
        port: impl ToString,
        role: Role,
    ) -> Self {
        Self {
            item_size,
            vector_length,
            host: host.into(),
            port: port.to_string(),
            role,
            poll_interval_ms: default_poll_interval_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            backoff: BackoffSettings::default(),
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> SourceResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| SourceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: &Path) -> SourceResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> SourceResult<String> {
        toml::to_string_pretty(self).map_err(|e| SourceError::Config(e.to_string()))
    }

    /// Check that the values can produce a working source
    pub fn validate(&self) -> SourceResult<()> {
        BlockGeometry::new(self.item_size, self.vector_length)?;

        if self.port.trim().is_empty() {
            return Err(SourceError::Config("port must be set".into()));
        }
        if self.role == Role::Client && self.host.trim().is_empty() {
            return Err(SourceError::Config("client role requires a host".into()));
        }

        let backoff = &self.backoff;
        if backoff.multiplier.is_nan() || backoff.multiplier < 1.0 {
            return Err(SourceError::Config(format!(
                "backoff multiplier must be at least 1.0, got {}",
                backoff.multiplier
            )));
        }
        if !(0.0..=1.0).contains(&backoff.jitter) {
            return Err(SourceError::Config(format!(
                "backoff jitter must be within [0, 1], got {}",
                backoff.jitter
            )));
        }
        if backoff.initial_delay_ms > backoff.max_delay_ms {
            return Err(SourceError::Config(
                "backoff initial delay exceeds max delay".into(),
            ));
        }
        if backoff.max_attempts == Some(0) {
            return Err(SourceError::Config(
                "backoff max_attempts must be positive when set".into(),
            ));
        }
        Ok(())
    }

    /// Socket timing derived from this configuration
    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            poll_interval: non_zero_millis(self.poll_interval_ms),
            connect_timeout: non_zero_millis(self.connect_timeout_ms),
        }
    }

    /// Backoff parameters derived from this configuration
    pub fn backoff_config(&self) -> BackoffConfig {
        BackoffConfig {
            initial_delay: Duration::from_millis(self.backoff.initial_delay_ms),
            max_delay: Duration::from_millis(self.backoff.max_delay_ms),
            multiplier: self.backoff.multiplier,
            jitter: self.backoff.jitter,
            max_attempts: self.backoff.max_attempts,
        }
    }
}

fn non_zero_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}
