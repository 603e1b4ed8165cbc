use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use sipwire_sip_core::{Message, MessageAssembler};

use crate::config::StreamConfig;
use crate::error::{Error, Result};
use crate::transport::{Transport, TransportEvent};

// Largest payload an IPv4 UDP datagram can carry
const MAX_UDP_PACKET_SIZE: usize = 65_507;
// Default channel capacity
const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// UDP transport for SIP messages
#[derive(Clone)]
pub struct UdpTransport {
    inner: Arc<UdpTransportInner>,
}

struct UdpTransportInner {
    socket: UdpSocket,
    local_addr: SocketAddr,
    closed: AtomicBool,
    max_message_size: Option<usize>,
    events_tx: mpsc::Sender<TransportEvent>,
    receive_task: Mutex<Option<JoinHandle<()>>>,
}

impl UdpTransport {
    /// Creates a new UDP transport bound to the specified address
    pub async fn bind(
        addr: SocketAddr,
        channel_capacity: Option<usize>,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        Self::bind_with_config(addr, channel_capacity, &StreamConfig::default()).await
    }

    /// Like [`UdpTransport::bind`]; datagrams larger than the configured
    /// message size are dropped.
    pub async fn bind_with_config(
        addr: SocketAddr,
        channel_capacity: Option<usize>,
        config: &StreamConfig,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        let socket = UdpSocket::bind(addr).await.map_err(|e| Error::BindFailed(addr, e))?;
        let local_addr = socket.local_addr()?;
        info!(%local_addr, "SIP UDP transport bound");

        let capacity = channel_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(capacity);

        let transport = UdpTransport {
            inner: Arc::new(UdpTransportInner {
                socket,
                local_addr,
                closed: AtomicBool::new(false),
                max_message_size: config.max_message_size,
                events_tx,
                receive_task: Mutex::new(None),
            }),
        };

        let handle = transport.spawn_receive_loop();
        *transport.inner.receive_task.lock() = Some(handle);

        Ok((transport, events_rx))
    }

    // Spawns a task to receive datagrams from the socket
    fn spawn_receive_loop(&self) -> JoinHandle<()> {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let assembler = MessageAssembler::new();
            let mut buffer = vec![0u8; MAX_UDP_PACKET_SIZE];

            while !inner.closed.load(Ordering::Relaxed) {
                let (len, source) = match inner.socket.recv_from(&mut buffer).await {
                    Ok(received) => received,
                    Err(e) => {
                        if inner.closed.load(Ordering::Relaxed) {
                            break;
                        }
                        error!(error = %e, "error receiving UDP datagram");
                        let _ = inner
                            .events_tx
                            .send(TransportEvent::Error {
                                error: format!("Error receiving datagram: {}", e),
                            })
                            .await;
                        continue;
                    }
                };

                let packet = &buffer[..len];
                if packet.iter().all(|b| b.is_ascii_whitespace()) {
                    trace!(%source, "ignoring keep-alive datagram");
                    continue;
                }
                if let Some(limit) = inner.max_message_size.filter(|limit| len > *limit) {
                    warn!(%source, len, limit, "dropping oversized datagram");
                    continue;
                }

                match assembler.parse_datagram(packet) {
                    Ok(message) => {
                        debug!(%source, summary = %message.summary(), "received datagram");
                        let event = TransportEvent::MessageReceived {
                            message,
                            source,
                            destination: inner.local_addr,
                        };
                        if inner.events_tx.send(event).await.is_err() {
                            debug!("event receiver dropped, stopping UDP receive loop");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(%source, error = %e, "dropping unparsable datagram");
                    }
                }
            }

            let _ = inner.events_tx.send(TransportEvent::Closed).await;
            info!(local_addr = %inner.local_addr, "UDP receive loop terminated");
        })
    }
}

#[async_trait::async_trait]
impl Transport for UdpTransport {
    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.local_addr)
    }

    async fn send_message(&self, message: Message, destination: SocketAddr) -> Result<()> {
        if self.is_closed() {
            return Err(Error::TransportClosed);
        }

        let bytes = message.to_bytes();
        if bytes.len() > MAX_UDP_PACKET_SIZE {
            return Err(Error::MessageTooLarge {
                size: bytes.len(),
                limit: MAX_UDP_PACKET_SIZE,
            });
        }
        debug!(%destination, len = bytes.len(), summary = %message.summary(), "sending datagram");

        self.inner
            .socket
            .send_to(&bytes, destination)
            .await
            .map_err(|e| Error::SendFailed(destination, e))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.inner.closed.swap(true, Ordering::Relaxed) {
            let task = self.inner.receive_task.lock().take();
            if let Some(task) = task {
                task.abort();
            }
            let _ = self.inner.events_tx.send(TransportEvent::Closed).await;
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Relaxed)
    }

    fn is_reliable(&self) -> bool {
        false
    }
}

impl fmt::Debug for UdpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UdpTransport({})", self.inner.local_addr)
    }
}
