//! Stack configuration.
//!
//! [`StackConfig`] is the single configuration surface for the engine:
//! retransmission timers, the completed-state linger, framing limits and
//! logging. Durations are stored as milliseconds so that TOML and JSON
//! files stay readable; the consuming crates convert them into their own
//! typed settings (`TimerSettings`, `StreamConfig`).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{Error, Result};
use crate::logging::LoggingConfig;

/// Default maximum size of a single message on a stream transport
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 65_535;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    /// Initial retransmission interval (T1)
    pub t1_ms: u64,
    /// Retransmission interval ceiling (T2)
    pub t2_ms: u64,
    /// Maximum time a message may stay in the network (T4)
    pub t4_ms: u64,
    /// How long a completed client INVITE lingers on unreliable transports (Timer D)
    pub cleanup_ms: u64,
    /// Delay before an INVITE server transaction answers 100 Trying on its own
    pub trying_delay_ms: u64,
    /// Largest accepted message on a stream transport, 0 for unlimited
    pub max_message_size: usize,
    /// Longest a stream read may wait for bytes, 0 to disable the guard
    pub starvation_timeout_ms: u64,
    pub logging: LoggingConfig,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            t1_ms: 500,
            t2_ms: 4_000,
            t4_ms: 5_000,
            cleanup_ms: 32_000,
            trying_delay_ms: 200,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            starvation_timeout_ms: 30_000,
            logging: LoggingConfig::default(),
        }
    }
}

impl StackConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: StackConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: StackConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file, picking the format from its extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loading stack configuration");

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&text),
            Some("toml") | None => Self::from_toml_str(&text),
            Some(other) => Err(Error::Config(format!(
                "Unsupported configuration format: .{}",
                other
            ))),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.t1_ms == 0 {
            return Err(Error::Config("t1_ms must be greater than zero".to_string()));
        }
        if self.t2_ms < self.t1_ms {
            return Err(Error::Config(format!(
                "t2_ms ({}) must not be smaller than t1_ms ({})",
                self.t2_ms, self.t1_ms
            )));
        }
        Ok(())
    }

    pub fn t1(&self) -> Duration {
        Duration::from_millis(self.t1_ms)
    }

    pub fn t2(&self) -> Duration {
        Duration::from_millis(self.t2_ms)
    }

    pub fn t4(&self) -> Duration {
        Duration::from_millis(self.t4_ms)
    }

    pub fn cleanup(&self) -> Duration {
        Duration::from_millis(self.cleanup_ms)
    }

    pub fn trying_delay(&self) -> Duration {
        Duration::from_millis(self.trying_delay_ms)
    }

    /// `None` when the starvation guard is disabled.
    pub fn starvation_timeout(&self) -> Option<Duration> {
        (self.starvation_timeout_ms > 0).then(|| Duration::from_millis(self.starvation_timeout_ms))
    }

    /// `None` when message size is unlimited.
    pub fn max_message_size(&self) -> Option<usize> {
        (self.max_message_size > 0).then_some(self.max_message_size)
    }
}
