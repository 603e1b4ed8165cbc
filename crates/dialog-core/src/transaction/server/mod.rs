//! Server transactions (RFC 3261 section 17.2).
//!
//! A server transaction is created by the manager when a request with an
//! unknown branch arrives. Responses reach it from the transaction user as
//! [`ProcessMessage`](crate::transaction::InternalTransactionCommand::ProcessMessage)
//! commands carrying a `Message::Response`; retransmitted requests arrive
//! the same way from the wire.

pub mod invite;
pub mod non_invite;
