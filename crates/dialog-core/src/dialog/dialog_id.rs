use std::fmt;

use serde::{Deserialize, Serialize};
use sipwire_sip_core::{HeaderAccess, Request};

/// Identifies a dialog from this side: Call-ID, our tag and the peer's tag.
///
/// The two ends of a dialog use mirrored IDs: our local tag is the peer's
/// remote tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DialogId {
    pub call_id: String,
    pub local_tag: String,
    pub remote_tag: String,
}

impl DialogId {
    pub fn new(call_id: impl Into<String>, local_tag: impl Into<String>, remote_tag: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            local_tag: local_tag.into(),
            remote_tag: remote_tag.into(),
        }
    }

    /// ID of the dialog an incoming in-dialog request belongs to: the To
    /// tag is ours, the From tag is the peer's.
    pub fn for_incoming_request(request: &Request) -> Option<Self> {
        Some(Self::new(request.call_id()?, request.to_tag()?, request.from_tag()?))
    }

    /// The same dialog as seen from the other end.
    pub fn reversed(&self) -> Self {
        Self::new(self.call_id.clone(), self.remote_tag.clone(), self.local_tag.clone())
    }
}

impl fmt::Display for DialogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};local={};remote={}", self.call_id, self.local_tag, self.remote_tag)
    }
}
