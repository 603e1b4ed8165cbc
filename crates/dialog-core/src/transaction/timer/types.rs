use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sipwire_infra_common::StackConfig;

/// The RFC 3261 transaction timers, RFC 6026's L and M, and the delay
/// before an INVITE server transaction answers `100 Trying` on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimerType {
    /// INVITE request retransmission
    A,
    /// INVITE transaction timeout
    B,
    /// Wait for response retransmissions after a non-2xx final response
    D,
    /// Non-INVITE request retransmission
    E,
    /// Non-INVITE transaction timeout
    F,
    /// INVITE final response retransmission
    G,
    /// Wait for the ACK of a final response
    H,
    /// Wait for ACK retransmissions
    I,
    /// Wait for non-INVITE request retransmissions
    J,
    /// Wait for non-INVITE response retransmissions
    K,
    /// Server INVITE lingering in Accepted
    L,
    /// Client INVITE lingering in Accepted
    M,
    /// Automatic 100 Trying
    Trying,
}

impl fmt::Display for TimerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimerType::A => "A",
            TimerType::B => "B",
            TimerType::D => "D",
            TimerType::E => "E",
            TimerType::F => "F",
            TimerType::G => "G",
            TimerType::H => "H",
            TimerType::I => "I",
            TimerType::J => "J",
            TimerType::K => "K",
            TimerType::L => "L",
            TimerType::M => "M",
            TimerType::Trying => "Trying",
        };
        f.write_str(name)
    }
}

/// Durations the transaction state machines are driven by.
///
/// The values here are the unreliable-transport ones. The `wait_*`
/// accessors collapse to zero on reliable transports, where nothing has to
/// be absorbed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSettings {
    /// RTT estimate; first retransmission interval
    pub t1: Duration,
    /// Retransmission interval ceiling
    pub t2: Duration,
    /// Maximum time a message stays in the network
    pub t4: Duration,
    /// 64*T1: Timers B, F, H, J, L and M
    pub transaction_timeout: Duration,
    /// Timer D on unreliable transports
    pub wait_time_d: Duration,
    pub trying_delay: Duration,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self::from(&StackConfig::default())
    }
}

impl From<&StackConfig> for TimerSettings {
    fn from(config: &StackConfig) -> Self {
        let t1 = config.t1();
        Self {
            t1,
            t2: config.t2(),
            t4: config.t4(),
            transaction_timeout: t1 * 64,
            wait_time_d: config.cleanup(),
            trying_delay: config.trying_delay(),
        }
    }
}

impl TimerSettings {
    /// Settings scaled from T1 alone, keeping the RFC ratios.
    pub fn with_t1(t1: Duration) -> Self {
        Self {
            t1,
            t2: t1 * 8,
            t4: t1 * 10,
            transaction_timeout: t1 * 64,
            wait_time_d: t1 * 64,
            trying_delay: Duration::from_millis(200),
        }
    }

    /// Next retransmission interval after `current`: doubled, capped at T2.
    pub fn backoff(&self, current: Duration) -> Duration {
        std::cmp::min(current * 2, self.t2)
    }

    pub fn wait_time_d(&self, reliable: bool) -> Duration {
        if reliable {
            Duration::ZERO
        } else {
            self.wait_time_d
        }
    }

    pub fn wait_time_i(&self, reliable: bool) -> Duration {
        if reliable {
            Duration::ZERO
        } else {
            self.t4
        }
    }

    pub fn wait_time_j(&self, reliable: bool) -> Duration {
        if reliable {
            Duration::ZERO
        } else {
            self.transaction_timeout
        }
    }

    pub fn wait_time_k(&self, reliable: bool) -> Duration {
        if reliable {
            Duration::ZERO
        } else {
            self.t4
        }
    }
}
