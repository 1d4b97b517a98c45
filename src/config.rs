use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::frame::FloatByteOrder;
use crate::protocol::KillSemantics;

const MIN_TICK_PERIOD_MS: u64 = 1;
const MAX_TICK_PERIOD_MS: u64 = 1000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(alloc::string::String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriverConfig {
    /// Time without a heartbeat before the thrusters are killed.
    pub heartbeat_timeout_ms: u64,
    /// Watchdog cadence.
    pub tick_period_ms: u64,
    pub float_byte_order: FloatByteOrder,
    pub kill_semantics: KillSemantics,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout_ms: 1000,
            tick_period_ms: 20,
            float_byte_order: FloatByteOrder::default(),
            kill_semantics: KillSemantics::default(),
        }
    }
}

impl DriverConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat_timeout_ms == 0 {
            return Err(ConfigError::Invalid("heartbeat_timeout_ms must be non-zero".into()));
        }
        if !(MIN_TICK_PERIOD_MS..=MAX_TICK_PERIOD_MS).contains(&self.tick_period_ms) {
            return Err(ConfigError::Invalid(alloc::format!(
                "tick_period_ms {} outside {}..={}",
                self.tick_period_ms, MIN_TICK_PERIOD_MS, MAX_TICK_PERIOD_MS
            )));
        }
        if self.tick_period_ms >= self.heartbeat_timeout_ms {
            return Err(ConfigError::Invalid(alloc::format!(
                "tick_period_ms {} must be shorter than heartbeat_timeout_ms {}",
                self.tick_period_ms, self.heartbeat_timeout_ms
            )));
        }
        Ok(())
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }
}
