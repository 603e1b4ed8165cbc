pub mod stream;
pub mod tcp;
pub mod udp;

use std::fmt;
use std::net::SocketAddr;

use async_trait::async_trait;
use sipwire_sip_core::Message;

use crate::error::Result;

/// A SIP transport: sends messages and reports what it receives through a
/// [`TransportEvent`] channel handed out when it is bound.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    fn local_addr(&self) -> Result<SocketAddr>;

    async fn send_message(&self, message: Message, destination: SocketAddr) -> Result<()>;

    async fn close(&self) -> Result<()>;

    fn is_closed(&self) -> bool;

    /// Reliable (stream) transports disable request and response
    /// retransmission in the transaction layer.
    fn is_reliable(&self) -> bool;
}

/// Events a transport reports to its owner.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    MessageReceived {
        message: Message,
        source: SocketAddr,
        destination: SocketAddr,
    },

    /// One stream connection ended; the transport itself keeps running
    ConnectionClosed { remote: SocketAddr, reason: String },

    Error { error: String },

    /// The transport stopped
    Closed,
}
