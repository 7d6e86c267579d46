use serde::{Deserialize, Serialize};
use std::{io, path::Path, time::Duration};
use thiserror::Error;

use crate::{CONTROL_PERIOD, DEFAULT_LOAD_TIMEOUT, SLOT_DEADLINE};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("couldn't read config file: {0}")]
    Io(#[from] io::Error),
    #[error("couldn't parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("`{0}` must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("slot deadline ({deadline_ms}ms) is longer than the tick period ({period_ms}ms)")]
    DeadlineExceedsPeriod { deadline_ms: u64, period_ms: u64 },
}

/// Match timing. Every duration is in milliseconds.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct MatchConfig {
    pub tick_period_ms: u64,
    pub slot_deadline_ms: u64,
    pub load_timeout_ms: u64,
    /// stop after this many ticks, run until stopped otherwise
    pub max_ticks: Option<u64>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: CONTROL_PERIOD.as_millis() as u64,
            slot_deadline_ms: SLOT_DEADLINE.as_millis() as u64,
            load_timeout_ms: DEFAULT_LOAD_TIMEOUT.as_millis() as u64,
            max_ticks: None,
        }
    }
}

impl MatchConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("tick_period_ms", self.tick_period_ms),
            ("slot_deadline_ms", self.slot_deadline_ms),
            ("load_timeout_ms", self.load_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroDuration(name));
            }
        }
        if self.slot_deadline_ms > self.tick_period_ms {
            return Err(ConfigError::DeadlineExceedsPeriod {
                deadline_ms: self.slot_deadline_ms,
                period_ms: self.tick_period_ms,
            });
        }
        Ok(())
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    pub fn slot_deadline(&self) -> Duration {
        Duration::from_millis(self.slot_deadline_ms)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }
}
