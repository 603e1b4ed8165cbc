use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use sipwire_sip_core::{Message, Request, Response};
use sipwire_sip_transport::Transport;
use tokio::sync::mpsc;

use crate::transaction::error::Result;
use crate::transaction::runner::{AsRefKey, AsRefState, HasCommandSender, HasTransactionEvents};
use crate::transaction::timer::TimerSettings;
use crate::transaction::{
    AtomicTransactionState, InternalTransactionCommand, TransactionEvent, TransactionKey, TransactionKind,
};

/// State shared between a transaction's event loop and the manager.
///
/// The event loop is the only writer of `state`; the locks only guard the
/// stored messages and are never held across an await.
pub struct TransactionData {
    pub id: TransactionKey,
    pub kind: TransactionKind,
    pub state: Arc<AtomicTransactionState>,
    /// The request that created the transaction
    pub request: Mutex<Request>,
    /// Last response sent (server) or received (client)
    pub last_response: Mutex<Option<Response>>,
    /// Client INVITE: the ACK resent for retransmitted final responses
    pub ack: Mutex<Option<Request>>,
    /// Client INVITE: to-tags of the 2xx responses already delivered
    pub accepted_tags: Mutex<Vec<String>>,
    /// Server INVITE: the 2xx ACK was delivered
    pub ack_received: AtomicBool,
    pub retransmissions: AtomicU32,
    pub remote_addr: SocketAddr,
    pub transport: Arc<dyn Transport>,
    pub reliable: bool,
    pub events_tx: mpsc::Sender<TransactionEvent>,
    pub cmd_tx: mpsc::Sender<InternalTransactionCommand>,
    pub timer_config: TimerSettings,
}

impl TransactionData {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: TransactionKey,
        kind: TransactionKind,
        request: Request,
        remote_addr: SocketAddr,
        transport: Arc<dyn Transport>,
        events_tx: mpsc::Sender<TransactionEvent>,
        cmd_tx: mpsc::Sender<InternalTransactionCommand>,
        timer_config: TimerSettings,
    ) -> Self {
        let reliable = transport.is_reliable();
        Self {
            id,
            kind,
            state: Arc::new(AtomicTransactionState::new(crate::transaction::TransactionState::Initial)),
            request: Mutex::new(request),
            last_response: Mutex::new(None),
            ack: Mutex::new(None),
            accepted_tags: Mutex::new(Vec::new()),
            ack_received: AtomicBool::new(false),
            retransmissions: AtomicU32::new(0),
            remote_addr,
            transport,
            reliable,
            events_tx,
            cmd_tx,
            timer_config,
        }
    }

    pub fn request(&self) -> Request {
        self.request.lock().clone()
    }

    pub fn last_response(&self) -> Option<Response> {
        self.last_response.lock().clone()
    }

    pub fn set_last_response(&self, response: Response) {
        *self.last_response.lock() = Some(response);
    }

    pub async fn send(&self, message: Message) -> Result<()> {
        self.transport.send_message(message, self.remote_addr).await?;
        Ok(())
    }

    pub async fn send_request(&self) -> Result<()> {
        let request = self.request();
        self.send(Message::Request(request)).await
    }

    /// Retransmit the original request and count it.
    pub async fn retransmit_request(&self) -> Result<()> {
        self.retransmissions.fetch_add(1, Ordering::Relaxed);
        self.send_request().await
    }

    /// Resend the stored response, if any. Returns whether one was sent.
    pub async fn resend_last_response(&self) -> Result<bool> {
        match self.last_response() {
            Some(response) => {
                self.retransmissions.fetch_add(1, Ordering::Relaxed);
                self.send(Message::Response(response)).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn emit(&self, event: TransactionEvent) {
        let _ = self.events_tx.send(event).await;
    }
}

impl fmt::Debug for TransactionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionData")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.state.get())
            .field("remote_addr", &self.remote_addr)
            .field("reliable", &self.reliable)
            .finish()
    }
}

impl AsRefState for TransactionData {
    fn as_ref_state(&self) -> &Arc<AtomicTransactionState> {
        &self.state
    }
}

impl AsRefKey for TransactionData {
    fn as_ref_key(&self) -> &TransactionKey {
        &self.id
    }
}

impl HasTransactionEvents for TransactionData {
    fn get_tu_event_sender(&self) -> mpsc::Sender<TransactionEvent> {
        self.events_tx.clone()
    }
}

impl HasCommandSender for TransactionData {
    fn get_self_command_sender(&self) -> mpsc::Sender<InternalTransactionCommand> {
        self.cmd_tx.clone()
    }
}
