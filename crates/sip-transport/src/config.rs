//! Per-connection framing limits.

use std::time::Duration;

use sipwire_infra_common::StackConfig;

/// Read size used when the framer asks its stream for more bytes
pub const DEFAULT_READ_CHUNK: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Largest header block plus body accepted on a stream; `None` = unlimited
    pub max_message_size: Option<usize>,
    /// Longest wait for any byte before the connection is dropped; `None`
    /// disables the guard
    pub starvation_timeout: Option<Duration>,
    pub read_chunk: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::from(&StackConfig::default())
    }
}

impl From<&StackConfig> for StreamConfig {
    fn from(config: &StackConfig) -> Self {
        Self {
            max_message_size: config.max_message_size(),
            starvation_timeout: config.starvation_timeout(),
            read_chunk: DEFAULT_READ_CHUNK,
        }
    }
}

impl StreamConfig {
    pub fn unlimited() -> Self {
        Self {
            max_message_size: None,
            starvation_timeout: None,
            read_chunk: DEFAULT_READ_CHUNK,
        }
    }

    pub fn with_max_message_size(mut self, limit: usize) -> Self {
        self.max_message_size = (limit > 0).then_some(limit);
        self
    }

    pub fn with_starvation_timeout(mut self, timeout: Duration) -> Self {
        self.starvation_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }
}
