use std::net::SocketAddr;

use sipwire_sip_core::{Request, Response};

use crate::transaction::{TransactionKey, TransactionState};

/// Events the transaction layer reports to its user (the dialog layer or
/// the application).
///
/// Every logical request, response and timeout is reported exactly once:
/// retransmissions are absorbed by the transaction they belong to.
#[derive(Debug, Clone)]
pub enum TransactionEvent {
    /// A request that started a new server transaction
    NewRequest {
        transaction_id: TransactionKey,
        request: Request,
        source: SocketAddr,
    },

    /// The ACK for a 2xx, matched to its Accepted INVITE server transaction
    AckReceived {
        transaction_id: TransactionKey,
        request: Request,
    },

    ProvisionalResponse {
        transaction_id: TransactionKey,
        response: Response,
    },

    SuccessResponse {
        transaction_id: TransactionKey,
        response: Response,
    },

    FailureResponse {
        transaction_id: TransactionKey,
        response: Response,
    },

    /// Timer B or F fired before a final response arrived
    TransactionTimeout { transaction_id: TransactionKey },

    /// Timer H fired: the ACK for our final response never came
    AckTimeout { transaction_id: TransactionKey },

    /// Sending failed; the transaction has been terminated
    TransportError {
        transaction_id: TransactionKey,
        error: String,
    },

    StateChanged {
        transaction_id: TransactionKey,
        previous_state: TransactionState,
        new_state: TransactionState,
    },

    TransactionTerminated { transaction_id: TransactionKey },

    /// A request no transaction could take (an ACK matching nothing)
    StrayRequest { request: Request, source: SocketAddr },

    /// A response matching no client transaction
    StrayResponse { response: Response, source: SocketAddr },

    Error {
        transaction_id: Option<TransactionKey>,
        error: String,
    },
}

impl TransactionEvent {
    /// Transaction the event is about, if any.
    pub fn transaction_id(&self) -> Option<&TransactionKey> {
        match self {
            TransactionEvent::NewRequest { transaction_id, .. }
            | TransactionEvent::AckReceived { transaction_id, .. }
            | TransactionEvent::ProvisionalResponse { transaction_id, .. }
            | TransactionEvent::SuccessResponse { transaction_id, .. }
            | TransactionEvent::FailureResponse { transaction_id, .. }
            | TransactionEvent::TransactionTimeout { transaction_id }
            | TransactionEvent::AckTimeout { transaction_id }
            | TransactionEvent::TransportError { transaction_id, .. }
            | TransactionEvent::StateChanged { transaction_id, .. }
            | TransactionEvent::TransactionTerminated { transaction_id } => Some(transaction_id),
            TransactionEvent::Error { transaction_id, .. } => transaction_id.as_ref(),
            TransactionEvent::StrayRequest { .. } | TransactionEvent::StrayResponse { .. } => None,
        }
    }
}
