use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in SIP transports
#[derive(Error, Debug)]
pub enum Error {
    /// Byte stream could not be split into messages
    #[error("Framing error: {0}")]
    Framing(String),

    #[error("Message of {size} bytes exceeds the {limit} byte limit")]
    MessageTooLarge { size: usize, limit: usize },

    /// No bytes arrived within the starvation timeout
    #[error("No data received for {0:?}")]
    Starvation(Duration),

    /// The consumer of framed messages went away
    #[error("Message listener closed")]
    ListenerClosed,

    #[error("Connection to {0} closed")]
    ConnectionClosed(SocketAddr),

    #[error("Failed to bind to {0}: {1}")]
    BindFailed(SocketAddr, #[source] io::Error),

    #[error("Failed to connect to {0}: {1}")]
    ConnectFailed(SocketAddr, #[source] io::Error),

    #[error("Failed to send to {0}: {1}")]
    SendFailed(SocketAddr, #[source] io::Error),

    #[error("Transport is closed")]
    TransportClosed,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("SIP parse error: {0}")]
    Parse(#[from] sipwire_sip_core::Error),
}

impl Error {
    /// Errors after which the connection they occurred on must be closed.
    pub fn is_fatal_to_connection(&self) -> bool {
        !matches!(self, Error::Parse(_))
    }
}
