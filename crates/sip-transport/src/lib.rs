//! SIP transports for the sipwire stack.
//!
//! Datagram transports parse each packet on its own; stream transports run
//! a [`StreamFramer`] per connection to recover message boundaries. Both
//! report to their owner through a [`TransportEvent`] channel.

pub mod config;
pub mod error;
pub mod transport;

#[cfg(test)]
mod tests;

pub use config::StreamConfig;
pub use error::{Error, Result};
pub use transport::stream::{MessageSink, SipStreamCodec, StreamFramer};
pub use transport::tcp::TcpTransport;
pub use transport::udp::UdpTransport;
pub use transport::{Transport, TransportEvent};

/// Bind a UDP transport to the specified address
pub async fn bind_udp(
    addr: std::net::SocketAddr,
) -> Result<(UdpTransport, tokio::sync::mpsc::Receiver<TransportEvent>)> {
    UdpTransport::bind(addr, None).await
}

/// Bind a TCP transport to the specified address
pub async fn bind_tcp(
    addr: std::net::SocketAddr,
) -> Result<(TcpTransport, tokio::sync::mpsc::Receiver<TransportEvent>)> {
    TcpTransport::bind(addr, None, None).await
}

pub mod prelude {
    pub use crate::{
        bind_tcp, bind_udp, Error, MessageSink, Result, StreamConfig, StreamFramer, TcpTransport, Transport,
        TransportEvent, UdpTransport,
    };
}
