//! Client transactions (RFC 3261 section 17.1).

pub mod invite;
pub mod non_invite;

use sipwire_sip_core::Response;

use crate::transaction::TransactionData;

/// A provisional response equal to the last one received is a
/// retransmission and is not reported again.
pub(crate) fn is_repeated_provisional(data: &TransactionData, response: &Response) -> bool {
    data.last_response
        .lock()
        .as_ref()
        .is_some_and(|last| last.status().is_provisional() && last == response)
}
