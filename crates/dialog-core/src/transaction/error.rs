use thiserror::Error;

use crate::transaction::{TransactionKey, TransactionKind, TransactionState};

/// Result type for transaction operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the transaction layer.
///
/// Timeouts are not errors: they reach the transaction user as
/// [`TransactionEvent::TransactionTimeout`](crate::transaction::TransactionEvent).
#[derive(Error, Debug)]
pub enum Error {
    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionKey),

    #[error("Transaction already exists: {0}")]
    TransactionExists(TransactionKey),

    #[error("Invalid {kind:?} state transition: {from:?} -> {to:?}")]
    InvalidStateTransition {
        kind: TransactionKind,
        from: TransactionState,
        to: TransactionState,
    },

    /// The request cannot start or belong to a transaction (no branch, ACK, ...)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Transport error: {0}")]
    Transport(#[from] sipwire_sip_transport::Error),

    /// The transaction's event loop is gone
    #[error("Transaction channel closed")]
    ChannelClosed,

    #[error("SIP error: {0}")]
    Core(#[from] sipwire_sip_core::Error),
}

impl Error {
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}
