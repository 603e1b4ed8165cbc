use thiserror::Error;

use crate::dialog::{DialogId, DialogState};

/// Result type for dialog operations
pub type DialogResult<T> = std::result::Result<T, DialogError>;

/// Errors raised by the dialog layer.
#[derive(Error, Debug)]
pub enum DialogError {
    /// A request or response that breaks the dialog rules, such as an
    /// in-dialog request whose CSeq went backwards
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// A dialog needs both tags
    #[error("Missing {0} tag")]
    MissingTag(&'static str),

    #[error("Dialog not found: {0}")]
    DialogNotFound(DialogId),

    #[error("Operation not allowed in {state} dialog {id}")]
    InvalidState { id: DialogId, state: DialogState },

    /// The local CSeq reached 2**31 - 1
    #[error("Local CSeq space exhausted in dialog {0}")]
    SequenceExhausted(DialogId),

    /// The next hop is not an IP literal; resolving names is up to the
    /// application
    #[error("No destination for {0}")]
    NoDestination(String),

    #[error("Transaction error: {0}")]
    Transaction(#[from] crate::transaction::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] sipwire_sip_transport::Error),

    #[error("SIP error: {0}")]
    Core(#[from] sipwire_sip_core::Error),
}

impl DialogError {
    pub fn protocol_error(message: impl Into<String>) -> Self {
        DialogError::ProtocolViolation(message.into())
    }

    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, DialogError::ProtocolViolation(_))
    }
}
