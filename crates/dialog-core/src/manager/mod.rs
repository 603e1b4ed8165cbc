//! Dialog manager: the dialog layer on top of a [`TransactionManager`].
//!
//! The manager creates dialogs from the transactions that establish them,
//! builds and sends in-dialog requests, and applies in-dialog requests and
//! responses. Each dialog sits behind its own async mutex, so concurrent
//! transactions of one dialog apply their changes one at a time while
//! different dialogs proceed in parallel.
//!
//! The manager can be driven straight from the transaction event stream:
//!
//! ```no_run
//! # use sipwire_dialog_core::{DialogManager, TransactionManager, TransactionEvent};
//! # async fn run(transactions: TransactionManager, mut events: tokio::sync::mpsc::Receiver<TransactionEvent>) {
//! let (dialogs, _dialog_events) = DialogManager::new(transactions);
//! while let Some(event) = events.recv().await {
//!     if let Err(e) = dialogs.process_transaction_event(&event).await {
//!         tracing::warn!(error = %e, "Dialog layer rejected event");
//!     }
//! }
//! # }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sipwire_sip_core::{Header, HeaderAccess, HeaderName, HeaderValue, Method, Request, Response, StatusCode};
use sipwire_sip_core::types::ContactValue;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::dialog::{local_contact, Dialog, DialogId, DialogState};
use crate::errors::{DialogError, DialogResult};
use crate::transaction::utils::{create_response, generate_branch, generate_tag, uri_socket_addr, via_for_transport};
use crate::transaction::{TransactionEvent, TransactionKey, TransactionManager};

/// Default capacity of the dialog event channel
const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Dialog lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialogEvent {
    Created {
        dialog_id: DialogId,
        state: DialogState,
    },
    StateChanged {
        dialog_id: DialogId,
        previous_state: DialogState,
        new_state: DialogState,
    },
    Terminated {
        dialog_id: DialogId,
    },
}

#[derive(Clone)]
pub struct DialogManager {
    transactions: TransactionManager,
    dialogs: Arc<DashMap<DialogId, Arc<Mutex<Dialog>>>>,
    /// Dialogs each transaction updates. A forked INVITE can create
    /// several early dialogs, one per to-tag.
    transaction_to_dialog: Arc<DashMap<TransactionKey, Vec<DialogId>>>,
    events_tx: mpsc::Sender<DialogEvent>,
}

impl std::fmt::Debug for DialogManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogManager")
            .field("dialogs", &self.dialogs.len())
            .field("bindings", &self.transaction_to_dialog.len())
            .finish()
    }
}

impl DialogManager {
    pub fn new(transactions: TransactionManager) -> (Self, mpsc::Receiver<DialogEvent>) {
        let (events_tx, events_rx) = mpsc::channel(DEFAULT_EVENT_CAPACITY);
        let manager = Self {
            transactions,
            dialogs: Arc::new(DashMap::new()),
            transaction_to_dialog: Arc::new(DashMap::new()),
            events_tx,
        };
        (manager, events_rx)
    }

    pub fn transactions(&self) -> &TransactionManager {
        &self.transactions
    }

    /// Snapshot of a dialog.
    pub async fn get(&self, id: &DialogId) -> Option<Dialog> {
        let dialog = self.dialog(id).ok()?;
        let snapshot = dialog.lock().await.clone();
        Some(snapshot)
    }

    pub async fn state(&self, id: &DialogId) -> Option<DialogState> {
        self.get(id).await.map(|dialog| dialog.state)
    }

    pub fn dialog_ids(&self) -> Vec<DialogId> {
        self.dialogs.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn dialog_count(&self) -> usize {
        self.dialogs.len()
    }

    /// First dialog a transaction is bound to, if any.
    pub fn dialog_for_transaction(&self, key: &TransactionKey) -> Option<DialogId> {
        self.transaction_to_dialog
            .get(key)
            .and_then(|entry| entry.value().first().cloned())
    }

    /// Every dialog a transaction is bound to, in creation order.
    pub fn dialogs_for_transaction(&self, key: &TransactionKey) -> Vec<DialogId> {
        self.transaction_to_dialog
            .get(key)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Build the next in-dialog request without sending it. Takes a fresh
    /// local CSeq.
    pub async fn create_request(&self, id: &DialogId, method: Method) -> DialogResult<Request> {
        let dialog = self.dialog(id)?;
        let mut dialog = dialog.lock().await;
        dialog.create_request(method)
    }

    /// Build and send an in-dialog request on a new client transaction
    /// bound to the dialog. Returns the transaction's key.
    pub async fn send_request(&self, id: &DialogId, method: Method) -> DialogResult<TransactionKey> {
        let dialog = self.dialog(id)?;
        let mut dialog = dialog.lock().await;

        let mut request = dialog.create_request(method)?;
        let destination = next_hop_addr(&dialog)?;
        self.add_transport_headers(&mut request, generate_branch())?;

        let key = self.transactions.create_client_transaction(request, destination).await?;
        self.bind(&key, id);
        self.transactions.send_request(&key).await?;
        debug!(dialog = %id, transaction = %key, seq = dialog.local_seq, "Sent in-dialog request");
        Ok(key)
    }

    /// Send the ACK for the 2xx that INVITE transaction `invite` received.
    pub async fn send_ack(&self, id: &DialogId, invite: &TransactionKey) -> DialogResult<()> {
        let invite_seq = self
            .transactions
            .original_request(invite)?
            .cseq()
            .map(|cseq| cseq.seq)
            .ok_or_else(|| DialogError::protocol_error("INVITE has no CSeq"))?;

        let dialog = self.dialog(id)?;
        let dialog = dialog.lock().await;
        let mut ack = dialog.create_ack(invite_seq);
        self.add_transport_headers(&mut ack, generate_branch())?;
        self.transactions.send_ack(invite, ack).await?;
        debug!(dialog = %id, seq = invite_seq, "Sent ACK");
        Ok(())
    }

    /// Send `response` on server transaction `key`, creating the UAS dialog
    /// when it answers a dialog-creating request with 101-299.
    ///
    /// A missing to-tag and Contact are filled in for dialog-creating
    /// responses.
    pub async fn send_response(&self, key: &TransactionKey, mut response: Response) -> DialogResult<Option<DialogId>> {
        let request = self.transactions.original_request(key)?;
        let status = response.status();

        let bound = self.dialog_for_transaction(key);
        let creates_dialog = bound.is_none()
            && request.method.creates_dialog()
            && request.to_tag().is_none()
            && status != StatusCode::TRYING
            && (status.is_provisional() || status.is_success());

        if creates_dialog {
            if response.to_tag().is_none() {
                if let Some(to) = response.to_address_mut() {
                    to.set_tag(generate_tag());
                }
            }
            if response.contacts().is_empty() {
                let contact = local_contact(self.transactions.transport().local_addr()?);
                response.push_header(Header::new(
                    HeaderName::Contact,
                    HeaderValue::Contact(ContactValue::Addresses(vec![contact])),
                ));
            }
        }

        let dialog_id = if creates_dialog {
            let dialog = Dialog::from_uas(&request, &response)?;
            let id = dialog.id.clone();
            // A second provisional from the same UAS reuses the dialog
            self.insert_dialog(dialog).await;
            self.bind(key, &id);
            Some(id)
        } else {
            bound
        };

        self.transactions.send_response(key, response.clone()).await?;

        if let Some(id) = &dialog_id {
            self.apply_response(id, key.method(), &response).await?;
        }
        Ok(dialog_id)
    }

    /// Apply a response received on client transaction `key`.
    ///
    /// A 101-299 with a to-tag to a dialog-creating request creates the
    /// UAC dialog (early for 1xx, confirmed for 2xx); every to-tag gets a
    /// dialog of its own. A 300-699 to a dialog-creating request ends every
    /// early dialog the transaction created, whatever its to-tag.
    /// Responses on in-dialog transactions update their dialog.
    pub async fn handle_response(&self, key: &TransactionKey, response: &Response) -> DialogResult<Option<DialogId>> {
        let bound = self.dialogs_for_transaction(key);
        let status = response.status();
        let creating = !key.is_server() && key.method().creates_dialog();

        if !creating {
            let Some(id) = bound.into_iter().next() else {
                return Ok(None);
            };
            self.apply_response(&id, key.method(), response).await?;
            return Ok(Some(id));
        }

        let same_tag = bound
            .iter()
            .find(|id| response.to_tag() == Some(id.remote_tag.as_str()))
            .cloned();

        if status.is_final() && !status.is_success() {
            if let Some(id) = &same_tag {
                self.apply_response(id, key.method(), response).await?;
            }
            self.terminate_early(key).await;
            return Ok(same_tag);
        }

        if let Some(id) = same_tag {
            self.apply_response(&id, key.method(), response).await?;
            return Ok(Some(id));
        }

        if status == StatusCode::TRYING || response.to_tag().is_none() {
            return Ok(None);
        }

        let request = self.transactions.original_request(key)?;
        let dialog = Dialog::from_uac_response(&request, response)?;
        let id = dialog.id.clone();
        if !self.insert_dialog(dialog).await {
            self.apply_response(&id, key.method(), response).await?;
        }
        self.bind(key, &id);
        Ok(Some(id))
    }

    /// Apply an incoming in-dialog request received on server transaction
    /// `key`.
    ///
    /// Requests without a to-tag are not in-dialog and return `Ok(None)`.
    /// A request for an unknown dialog is answered with 481, one whose
    /// CSeq went backwards with 500; both are returned as errors.
    pub async fn handle_request(&self, key: &TransactionKey, request: &Request) -> DialogResult<Option<DialogId>> {
        let Some(id) = DialogId::for_incoming_request(request) else {
            return Ok(None);
        };
        let is_ack = request.method == Method::Ack;

        let Ok(dialog) = self.dialog(&id) else {
            if !is_ack {
                warn!(dialog = %id, method = %request.method, "Request for unknown dialog, answering 481");
                let response = create_response(request, StatusCode::CALL_OR_TRANSACTION_DOES_NOT_EXIST);
                self.transactions.send_response(key, response).await?;
            }
            return Err(DialogError::DialogNotFound(id));
        };

        let applied = dialog.lock().await.apply_request(request);
        if let Err(e) = applied {
            if !is_ack && e.is_protocol_violation() {
                warn!(dialog = %id, error = %e, "Rejecting out-of-order request with 500");
                let response = create_response(request, StatusCode::SERVER_INTERNAL_ERROR);
                self.transactions.send_response(key, response).await?;
            }
            return Err(e);
        }

        if !is_ack {
            self.bind(key, &id);
        }
        debug!(dialog = %id, method = %request.method, "Applied in-dialog request");
        Ok(Some(id))
    }

    /// Terminate a dialog locally. No BYE is sent.
    pub async fn terminate(&self, id: &DialogId) -> DialogResult<()> {
        let dialog = self.dialog(id)?;
        let previous = {
            let mut dialog = dialog.lock().await;
            let previous = dialog.state;
            dialog.terminate();
            previous
        };
        self.finish_transition(id, previous, DialogState::Terminated).await;
        Ok(())
    }

    /// Drive the dialog layer from one transaction event. Returns the
    /// dialog the event applied to, if any.
    pub async fn process_transaction_event(&self, event: &TransactionEvent) -> DialogResult<Option<DialogId>> {
        match event {
            TransactionEvent::NewRequest {
                transaction_id, request, ..
            } => self.handle_request(transaction_id, request).await,
            TransactionEvent::AckReceived {
                transaction_id, request, ..
            } => self.handle_request(transaction_id, request).await,
            TransactionEvent::ProvisionalResponse {
                transaction_id,
                response,
            }
            | TransactionEvent::SuccessResponse {
                transaction_id,
                response,
            }
            | TransactionEvent::FailureResponse {
                transaction_id,
                response,
            } => self.handle_response(transaction_id, response).await,
            TransactionEvent::TransactionTimeout { transaction_id }
            | TransactionEvent::TransportError { transaction_id, .. } => {
                let bound = self.dialogs_for_transaction(transaction_id);
                for id in &bound {
                    info!(dialog = %id, transaction = %transaction_id, "Transaction failed, terminating dialog");
                    // Already gone if an earlier event ended it
                    let _ = self.terminate(id).await;
                }
                Ok(bound.into_iter().next())
            }
            TransactionEvent::TransactionTerminated { transaction_id } => {
                if !transaction_id.is_server() && transaction_id.method().creates_dialog() {
                    self.terminate_early(transaction_id).await;
                }
                Ok(self
                    .transaction_to_dialog
                    .remove(transaction_id)
                    .and_then(|(_, ids)| ids.into_iter().next()))
            }
            _ => Ok(None),
        }
    }

    fn dialog(&self, id: &DialogId) -> DialogResult<Arc<Mutex<Dialog>>> {
        self.dialogs
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| DialogError::DialogNotFound(id.clone()))
    }

    /// Store a new dialog. Returns false, leaving the stored one alone,
    /// when a dialog with the same id already exists.
    async fn insert_dialog(&self, dialog: Dialog) -> bool {
        let id = dialog.id.clone();
        let state = dialog.state;
        let inserted = match self.dialogs.entry(id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(dialog)));
                true
            }
        };
        if inserted {
            info!(dialog = %id, state = %state, "Dialog created");
            let _ = self.events_tx.send(DialogEvent::Created { dialog_id: id, state }).await;
        }
        inserted
    }

    fn bind(&self, key: &TransactionKey, id: &DialogId) {
        let mut bound = self.transaction_to_dialog.entry(key.clone()).or_default();
        if !bound.contains(id) {
            bound.push(id.clone());
        }
    }

    /// End the dialogs of `key` that never left Early: the INVITE failed,
    /// or another fork answered and the transaction is over.
    async fn terminate_early(&self, key: &TransactionKey) {
        for id in self.dialogs_for_transaction(key) {
            let Ok(dialog) = self.dialog(&id) else {
                continue;
            };
            let ended = {
                let mut dialog = dialog.lock().await;
                let early = dialog.state == DialogState::Early;
                if early {
                    dialog.terminate();
                }
                early
            };
            if ended {
                debug!(dialog = %id, transaction = %key, "Early dialog ended with its transaction");
                self.finish_transition(&id, DialogState::Early, DialogState::Terminated).await;
            }
        }
    }

    async fn apply_response(&self, id: &DialogId, method: &Method, response: &Response) -> DialogResult<()> {
        let dialog = self.dialog(id)?;
        let transition = {
            let mut dialog = dialog.lock().await;
            let previous = dialog.state;
            dialog.update_from_response(method, response).then_some((previous, dialog.state))
        };
        if let Some((previous, new_state)) = transition {
            self.finish_transition(id, previous, new_state).await;
        }
        Ok(())
    }

    /// Report a state change; a terminated dialog is dropped with every
    /// binding to it.
    async fn finish_transition(&self, id: &DialogId, previous_state: DialogState, new_state: DialogState) {
        if previous_state != new_state {
            let _ = self
                .events_tx
                .send(DialogEvent::StateChanged {
                    dialog_id: id.clone(),
                    previous_state,
                    new_state,
                })
                .await;
        }
        if new_state.is_terminated() && self.dialogs.remove(id).is_some() {
            self.transaction_to_dialog.retain(|_, bound| {
                bound.retain(|other| other != id);
                !bound.is_empty()
            });
            info!(dialog = %id, "Dialog terminated");
            let _ = self.events_tx.send(DialogEvent::Terminated { dialog_id: id.clone() }).await;
        }
    }

    /// Top Via for the transport we send on, and a Contact for requests
    /// that refresh the remote target.
    fn add_transport_headers(&self, request: &mut Request, branch: String) -> DialogResult<()> {
        let transport = self.transactions.transport();
        let local_addr = transport.local_addr()?;
        let via = via_for_transport(local_addr, transport.is_reliable(), branch);
        request
            .headers
            .insert(0, Header::new(HeaderName::Via, HeaderValue::Via(vec![via])));
        if request.method.is_target_refresh() && request.contacts().is_empty() {
            request.push_header(Header::new(
                HeaderName::Contact,
                HeaderValue::Contact(ContactValue::Addresses(vec![local_contact(local_addr)])),
            ));
        }
        Ok(())
    }
}

fn next_hop_addr(dialog: &Dialog) -> DialogResult<SocketAddr> {
    let hop = dialog.next_hop();
    uri_socket_addr(hop).ok_or_else(|| DialogError::NoDestination(hop.to_string()))
}
