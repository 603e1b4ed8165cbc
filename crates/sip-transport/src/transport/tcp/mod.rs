//! TCP transport: an accept loop plus one framing task per connection.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use sipwire_sip_core::Message;

use crate::config::StreamConfig;
use crate::error::{Error, Result};
use crate::transport::stream::{MessageSink, StreamFramer};
use crate::transport::{Transport, TransportEvent};

// Default channel capacity
const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// TCP transport for SIP messages
#[derive(Clone)]
pub struct TcpTransport {
    inner: Arc<TcpTransportInner>,
}

struct TcpTransportInner {
    local_addr: SocketAddr,
    closed: AtomicBool,
    config: StreamConfig,
    events_tx: mpsc::Sender<TransportEvent>,
    connections: DashMap<SocketAddr, Arc<TcpConnection>>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

struct TcpConnection {
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
}

impl TcpConnection {
    fn abort(&self) {
        if let Some(task) = self.reader_task.lock().take() {
            task.abort();
        }
    }
}

/// Forwards framed messages of one connection as transport events.
struct ConnectionSink {
    events_tx: mpsc::Sender<TransportEvent>,
    source: SocketAddr,
    destination: SocketAddr,
}

#[async_trait]
impl MessageSink for ConnectionSink {
    async fn deliver(&mut self, message: Message) -> Result<()> {
        let event = TransportEvent::MessageReceived {
            message,
            source: self.source,
            destination: self.destination,
        };
        self.events_tx.send(event).await.map_err(|_| Error::ListenerClosed)
    }
}

impl TcpTransport {
    /// Binds a listener and starts accepting connections
    pub async fn bind(
        addr: SocketAddr,
        channel_capacity: Option<usize>,
        config: Option<StreamConfig>,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        let listener = TcpListener::bind(addr).await.map_err(|e| Error::BindFailed(addr, e))?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "SIP TCP transport bound");

        let capacity = channel_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(capacity);

        let transport = TcpTransport {
            inner: Arc::new(TcpTransportInner {
                local_addr,
                closed: AtomicBool::new(false),
                config: config.unwrap_or_default(),
                events_tx,
                connections: DashMap::new(),
                accept_task: Mutex::new(None),
            }),
        };

        let handle = transport.spawn_accept_loop(listener);
        *transport.inner.accept_task.lock() = Some(handle);

        Ok((transport, events_rx))
    }

    /// Number of open connections
    pub fn connection_count(&self) -> usize {
        self.inner.connections.len()
    }

    pub fn has_connection(&self, remote: &SocketAddr) -> bool {
        self.inner.connections.contains_key(remote)
    }

    fn spawn_accept_loop(&self, listener: TcpListener) -> JoinHandle<()> {
        let transport = self.clone();
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, remote)) => {
                        info!(%remote, "accepted TCP connection");
                        transport.register_connection(stream, remote);
                    }
                    Err(e) => {
                        if transport.is_closed() {
                            break;
                        }
                        error!(error = %e, "error accepting TCP connection");
                        let _ = transport
                            .inner
                            .events_tx
                            .send(TransportEvent::Error {
                                error: format!("Error accepting connection: {}", e),
                            })
                            .await;
                    }
                }
            }
        })
    }

    /// Store the connection and start its framing task.
    fn register_connection(&self, stream: TcpStream, remote: SocketAddr) -> Arc<TcpConnection> {
        let (reader, writer) = stream.into_split();
        let connection = Arc::new(TcpConnection {
            writer: tokio::sync::Mutex::new(writer),
            reader_task: Mutex::new(None),
        });
        if let Some(previous) = self.inner.connections.insert(remote, connection.clone()) {
            previous.abort();
        }

        let transport = self.clone();
        let owned = connection.clone();
        let handle = tokio::spawn(async move {
            let mut sink = ConnectionSink {
                events_tx: transport.inner.events_tx.clone(),
                source: remote,
                destination: transport.inner.local_addr,
            };
            let framer = StreamFramer::new(reader, transport.inner.config.clone());
            let reason = match framer.run(&mut sink).await {
                Ok(()) => {
                    debug!(%remote, "peer closed TCP connection");
                    "closed by peer".to_string()
                }
                Err(e) => {
                    warn!(%remote, error = %e, "closing TCP connection");
                    e.to_string()
                }
            };
            transport
                .inner
                .connections
                .remove_if(&remote, |_, current| Arc::ptr_eq(current, &owned));
            let _ = transport
                .inner
                .events_tx
                .send(TransportEvent::ConnectionClosed { remote, reason })
                .await;
        });
        *connection.reader_task.lock() = Some(handle);
        connection
    }

    async fn connection_to(&self, destination: SocketAddr) -> Result<Arc<TcpConnection>> {
        let existing = self.inner.connections.get(&destination).map(|c| c.value().clone());
        if let Some(existing) = existing {
            return Ok(existing);
        }
        let stream = TcpStream::connect(destination)
            .await
            .map_err(|e| Error::ConnectFailed(destination, e))?;
        info!(%destination, "opened TCP connection");
        Ok(self.register_connection(stream, destination))
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.local_addr)
    }

    async fn send_message(&self, message: Message, destination: SocketAddr) -> Result<()> {
        if self.is_closed() {
            return Err(Error::TransportClosed);
        }

        let connection = self.connection_to(destination).await?;
        let bytes = message.to_bytes();
        debug!(%destination, len = bytes.len(), summary = %message.summary(), "sending over TCP");

        let written = {
            let mut writer = connection.writer.lock().await;
            writer.write_all(&bytes).await
        };
        if let Err(e) = written {
            connection.abort();
            self.inner
                .connections
                .remove_if(&destination, |_, current| Arc::ptr_eq(current, &connection));
            return Err(Error::SendFailed(destination, e));
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::Relaxed) {
            return Ok(());
        }
        let accept = self.inner.accept_task.lock().take();
        if let Some(task) = accept {
            task.abort();
        }
        for entry in self.inner.connections.iter() {
            entry.value().abort();
        }
        self.inner.connections.clear();
        let _ = self.inner.events_tx.send(TransportEvent::Closed).await;
        info!(local_addr = %self.inner.local_addr, "TCP transport closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Relaxed)
    }

    fn is_reliable(&self) -> bool {
        true
    }
}

impl fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TcpTransport({}, {} connections)", self.inner.local_addr, self.inner.connections.len())
    }
}
