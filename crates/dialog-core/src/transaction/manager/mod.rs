//! # Transaction Manager
//!
//! The manager owns every live transaction and sits between the transport
//! and the transaction user:
//!
//! - messages from the transport are matched to a transaction by
//!   [`TransactionKey`] and handed to its event loop; a request with an
//!   unknown branch starts a server transaction and is reported as
//!   [`TransactionEvent::NewRequest`];
//! - the transaction user creates client transactions, sends responses
//!   through server transactions and hands down 2xx ACKs;
//! - every transaction's events flow through one forwarding task, which
//!   drops a transaction from the registry once it reports
//!   `TransactionTerminated`.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use sipwire_dialog_core::transaction::{TransactionEvent, TransactionManager};
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (transport, transport_rx) = sipwire_sip_transport::bind_udp("127.0.0.1:5060".parse()?).await?;
//! let (manager, mut events) = TransactionManager::new(Arc::new(transport), transport_rx, None);
//!
//! while let Some(event) = events.recv().await {
//!     if let TransactionEvent::NewRequest { transaction_id, request, .. } = event {
//!         let ok = sipwire_dialog_core::transaction::utils::create_response(
//!             &request,
//!             sipwire_sip_core::StatusCode::OK,
//!         );
//!         manager.send_response(&transaction_id, ok).await?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use sipwire_infra_common::StackConfig;
use sipwire_sip_core::{HeaderAccess, Message, Method, Request, Response};
use sipwire_sip_transport::{Transport, TransportEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::transaction::error::{Error, Result};
use crate::transaction::utils::is_ack_for;
use crate::transaction::{
    spawn_transaction_loop, InternalTransactionCommand, TimerSettings, TransactionData, TransactionEvent,
    TransactionKey, TransactionKind, TransactionState,
};

/// Default capacity of the event channels
const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Capacity of each transaction's command channel
const COMMAND_CAPACITY: usize = 32;

/// A live transaction: its shared data and the task running its loop.
struct TransactionHandle {
    data: Arc<TransactionData>,
    task: JoinHandle<()>,
}

/// Registry and router for RFC 3261 transactions. Cheap to clone; clones
/// share the same registry.
#[derive(Clone)]
pub struct TransactionManager {
    transport: Arc<dyn Transport>,
    timer_settings: TimerSettings,
    transactions: Arc<DashMap<TransactionKey, Arc<TransactionHandle>>>,
    /// Feeds the forwarding task; handed to every transaction
    events_tx: mpsc::Sender<TransactionEvent>,
    /// Message loop and event forwarder
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("transport", &self.transport)
            .field("transactions", &self.transactions.len())
            .finish()
    }
}

impl TransactionManager {
    /// Manager with the default RFC 3261 timers. `capacity` sizes the
    /// event channel (100 when `None`).
    pub fn new(
        transport: Arc<dyn Transport>,
        transport_rx: mpsc::Receiver<TransportEvent>,
        capacity: Option<usize>,
    ) -> (Self, mpsc::Receiver<TransactionEvent>) {
        Self::with_config(transport, transport_rx, capacity, TimerSettings::default())
    }

    /// Manager with timers taken from the stack configuration.
    pub fn from_stack_config(
        transport: Arc<dyn Transport>,
        transport_rx: mpsc::Receiver<TransportEvent>,
        config: &StackConfig,
    ) -> (Self, mpsc::Receiver<TransactionEvent>) {
        Self::with_config(transport, transport_rx, None, TimerSettings::from(config))
    }

    pub fn with_config(
        transport: Arc<dyn Transport>,
        transport_rx: mpsc::Receiver<TransportEvent>,
        capacity: Option<usize>,
        timer_settings: TimerSettings,
    ) -> (Self, mpsc::Receiver<TransactionEvent>) {
        let capacity = capacity.unwrap_or(DEFAULT_EVENT_CAPACITY);
        let (events_tx, internal_rx) = mpsc::channel(capacity);
        let (public_tx, public_rx) = mpsc::channel(capacity);

        let manager = Self {
            transport,
            timer_settings,
            transactions: Arc::new(DashMap::new()),
            events_tx,
            tasks: Arc::new(Mutex::new(Vec::new())),
        };

        let forwarder = tokio::spawn(forward_events(manager.transactions.clone(), internal_rx, public_tx));
        let receiver = tokio::spawn(manager.clone().message_loop(transport_rx));
        manager.tasks.lock().extend([forwarder, receiver]);

        info!(
            reliable = manager.transport.is_reliable(),
            t1 = ?manager.timer_settings.t1,
            "Transaction manager started"
        );
        (manager, public_rx)
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    pub fn timer_settings(&self) -> &TimerSettings {
        &self.timer_settings
    }

    /// Create a client transaction for `request`, to be sent to
    /// `destination` by [`send_request`](Self::send_request).
    ///
    /// The request must carry a Via with a branch. ACK never starts a
    /// transaction: use [`send_ack`](Self::send_ack) for a 2xx ACK.
    pub async fn create_client_transaction(
        &self,
        request: Request,
        destination: SocketAddr,
    ) -> Result<TransactionKey> {
        if request.method == Method::Ack {
            return Err(Error::InvalidRequest("ACK does not start a client transaction".to_string()));
        }
        let key = TransactionKey::for_client_request(&request)
            .ok_or_else(|| Error::InvalidRequest("request has no Via branch".to_string()))?;
        let kind = TransactionKind::for_method(&request.method, false);

        match self.transactions.entry(key.clone()) {
            Entry::Occupied(_) => Err(Error::TransactionExists(key)),
            Entry::Vacant(slot) => {
                debug!(id = %key, destination = %destination, "Created client transaction");
                slot.insert(self.start_transaction(key.clone(), kind, request, destination));
                Ok(key)
            }
        }
    }

    /// Send the request of a client transaction created by
    /// [`create_client_transaction`](Self::create_client_transaction).
    pub async fn send_request(&self, key: &TransactionKey) -> Result<()> {
        let handle = self.handle(key)?;
        let kind = handle.data.kind;
        let next = match kind {
            TransactionKind::InviteClient => TransactionState::Calling,
            TransactionKind::NonInviteClient => TransactionState::Trying,
            _ => {
                return Err(Error::InvalidRequest(format!("{} is a server transaction", key)));
            }
        };
        let current = handle.data.state.get();
        if current != TransactionState::Initial {
            return Err(Error::InvalidStateTransition {
                kind,
                from: current,
                to: next,
            });
        }
        command(&handle, InternalTransactionCommand::TransitionTo(next)).await
    }

    /// Send `response` through the server transaction `key`.
    ///
    /// Sending on a transaction that does not exist (never did, or already
    /// terminated) is a protocol violation. So is a response the
    /// transaction's state does not allow; that one is reported as an
    /// [`TransactionEvent::Error`] by the transaction itself.
    pub async fn send_response(&self, key: &TransactionKey, response: Response) -> Result<()> {
        let handle = self
            .transactions
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::ProtocolViolation(format!("no server transaction {} to respond on", key)))?;
        if !handle.data.kind.is_server() {
            return Err(Error::InvalidRequest(format!("{} is a client transaction", key)));
        }
        if handle.data.state.get().is_terminated() {
            return Err(Error::ProtocolViolation(format!("transaction {} has terminated", key)));
        }
        trace!(id = %key, status = %response.status(), "Sending response");
        command(&handle, InternalTransactionCommand::ProcessMessage(Message::Response(response))).await
    }

    /// Hand the ACK for a 2xx to the INVITE client transaction that
    /// received the 2xx. The transaction sends it and resends it for every
    /// 2xx retransmission.
    pub async fn send_ack(&self, key: &TransactionKey, ack: Request) -> Result<()> {
        if ack.method != Method::Ack {
            return Err(Error::InvalidRequest(format!("expected ACK, got {}", ack.method)));
        }
        let handle = self.handle(key)?;
        if handle.data.kind != TransactionKind::InviteClient {
            return Err(Error::InvalidRequest(format!("{} is not an INVITE client transaction", key)));
        }
        command(&handle, InternalTransactionCommand::ProcessMessage(Message::Request(ack))).await
    }

    /// Force a transaction to Terminated.
    pub async fn terminate(&self, key: &TransactionKey) -> Result<()> {
        let handle = self.handle(key)?;
        command(&handle, InternalTransactionCommand::Terminate).await
    }

    pub fn state(&self, key: &TransactionKey) -> Result<TransactionState> {
        Ok(self.handle(key)?.data.state.get())
    }

    pub fn kind(&self, key: &TransactionKey) -> Result<TransactionKind> {
        Ok(self.handle(key)?.data.kind)
    }

    /// The request that created the transaction.
    pub fn original_request(&self, key: &TransactionKey) -> Result<Request> {
        Ok(self.handle(key)?.data.request())
    }

    /// Last response sent (server) or received (client).
    pub fn last_response(&self, key: &TransactionKey) -> Result<Option<Response>> {
        Ok(self.handle(key)?.data.last_response())
    }

    /// Where the transaction sends: the request destination for client
    /// transactions, the request source for server transactions.
    pub fn remote_addr(&self, key: &TransactionKey) -> Result<SocketAddr> {
        Ok(self.handle(key)?.data.remote_addr)
    }

    pub fn transaction_exists(&self, key: &TransactionKey) -> bool {
        self.transactions.contains_key(key)
    }

    pub fn active_transactions(&self) -> Vec<TransactionKey> {
        self.transactions.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    /// Stop the message loop and every transaction. Pending timers die
    /// with their transactions.
    pub async fn shutdown(&self) {
        let keys = self.active_transactions();
        for key in keys {
            if let Some((_, handle)) = self.transactions.remove(&key) {
                handle.task.abort();
            }
        }
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        info!("Transaction manager stopped");
    }

    fn handle(&self, key: &TransactionKey) -> Result<Arc<TransactionHandle>> {
        self.transactions
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::TransactionNotFound(key.clone()))
    }

    fn start_transaction(
        &self,
        key: TransactionKey,
        kind: TransactionKind,
        request: Request,
        remote_addr: SocketAddr,
    ) -> Arc<TransactionHandle> {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CAPACITY);
        let data = Arc::new(TransactionData::new(
            key,
            kind,
            request,
            remote_addr,
            self.transport.clone(),
            self.events_tx.clone(),
            cmd_tx,
            self.timer_settings.clone(),
        ));
        let task = spawn_transaction_loop(data.clone(), cmd_rx);
        Arc::new(TransactionHandle { data, task })
    }

    async fn message_loop(self, mut transport_rx: mpsc::Receiver<TransportEvent>) {
        while let Some(event) = transport_rx.recv().await {
            match event {
                TransportEvent::MessageReceived { message, source, .. } => match message {
                    Message::Request(request) => self.handle_request(request, source).await,
                    Message::Response(response) => self.handle_response(response, source).await,
                },
                TransportEvent::ConnectionClosed { remote, reason } => {
                    debug!(remote = %remote, reason = %reason, "Connection closed");
                }
                TransportEvent::Error { error } => {
                    warn!(error = %error, "Transport reported an error");
                    let _ = self
                        .events_tx
                        .send(TransactionEvent::Error {
                            transaction_id: None,
                            error,
                        })
                        .await;
                }
                TransportEvent::Closed => {
                    info!("Transport closed, stopping message loop");
                    break;
                }
            }
        }
    }

    async fn handle_request(&self, request: Request, source: SocketAddr) {
        let Some(key) = TransactionKey::from_request(&request) else {
            warn!(method = %request.method, source = %source, "Dropping request without a Via branch");
            return;
        };

        if let Some(handle) = self.transactions.get(&key).map(|entry| entry.value().clone()) {
            trace!(id = %key, "Request matched existing transaction");
            dispatch(&handle, Message::Request(request)).await;
            return;
        }

        if request.method == Method::Ack {
            match self.find_invite_for_ack(&request) {
                Some(handle) => dispatch(&handle, Message::Request(request)).await,
                None => {
                    debug!(source = %source, call_id = ?request.call_id(), "ACK matches no transaction");
                    let _ = self.events_tx.send(TransactionEvent::StrayRequest { request, source }).await;
                }
            }
            return;
        }

        let kind = TransactionKind::for_method(&request.method, true);
        let existing = match self.transactions.entry(key.clone()) {
            Entry::Occupied(entry) => Some(entry.get().clone()),
            Entry::Vacant(slot) => {
                debug!(id = %key, source = %source, "New server transaction");
                slot.insert(self.start_transaction(key.clone(), kind, request.clone(), source));
                None
            }
        };

        match existing {
            Some(handle) => dispatch(&handle, Message::Request(request)).await,
            None => {
                let _ = self
                    .events_tx
                    .send(TransactionEvent::NewRequest {
                        transaction_id: key,
                        request,
                        source,
                    })
                    .await;
            }
        }
    }

    async fn handle_response(&self, response: Response, source: SocketAddr) {
        let handle = TransactionKey::from_response(&response)
            .and_then(|key| self.transactions.get(&key).map(|entry| entry.value().clone()));

        match handle {
            Some(handle) => dispatch(&handle, Message::Response(response)).await,
            None => {
                debug!(
                    status = %response.status(),
                    branch = ?response.top_via().and_then(|v| v.branch()),
                    source = %source,
                    "Dropping stray response"
                );
                let _ = self.events_tx.send(TransactionEvent::StrayResponse { response, source }).await;
            }
        }
    }

    /// The Accepted INVITE server transaction a 2xx ACK belongs to.
    fn find_invite_for_ack(&self, ack: &Request) -> Option<Arc<TransactionHandle>> {
        self.transactions
            .iter()
            .find(|entry| {
                let data = &entry.value().data;
                data.kind == TransactionKind::InviteServer
                    && data.state.get() == TransactionState::Accepted
                    && is_ack_for(&data.request.lock(), ack)
            })
            .map(|entry| entry.value().clone())
    }
}

async fn command(handle: &TransactionHandle, command: InternalTransactionCommand) -> Result<()> {
    handle.data.cmd_tx.send(command).await.map_err(|_| Error::ChannelClosed)
}

async fn dispatch(handle: &TransactionHandle, message: Message) {
    if command(handle, InternalTransactionCommand::ProcessMessage(message)).await.is_err() {
        debug!(id = %handle.data.id, "Transaction gone before message could be delivered");
    }
}

/// Forward transaction events to the transaction user, dropping
/// transactions from the registry as they terminate.
async fn forward_events(
    transactions: Arc<DashMap<TransactionKey, Arc<TransactionHandle>>>,
    mut internal_rx: mpsc::Receiver<TransactionEvent>,
    public_tx: mpsc::Sender<TransactionEvent>,
) {
    while let Some(event) = internal_rx.recv().await {
        if let TransactionEvent::TransactionTerminated { transaction_id } = &event {
            if transactions.remove(transaction_id).is_some() {
                debug!(id = %transaction_id, remaining = transactions.len(), "Transaction removed");
            }
        }
        if public_tx.send(event).await.is_err() {
            trace!("Transaction event receiver dropped");
        }
    }
}
