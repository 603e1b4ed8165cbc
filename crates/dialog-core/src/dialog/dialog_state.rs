use std::fmt;

use serde::{Deserialize, Serialize};

/// Dialog lifecycle state (RFC 3261 section 12).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DialogState {
    /// Created by a provisional response carrying a to-tag
    Early,
    /// Created or promoted by a 2xx
    Confirmed,
    Terminated,
}

impl DialogState {
    pub fn is_terminated(&self) -> bool {
        matches!(self, DialogState::Terminated)
    }
}

impl fmt::Display for DialogState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialogState::Early => f.write_str("Early"),
            DialogState::Confirmed => f.write_str("Confirmed"),
            DialogState::Terminated => f.write_str("Terminated"),
        }
    }
}
