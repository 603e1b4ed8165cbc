//! RFC 3261 transaction layer.
//!
//! A transaction is one request plus every response and retransmission
//! that shares its Via branch. Each transaction runs as its own task
//! ([`runner::run_transaction_loop`]) fed by a command channel, so
//! message arrivals and timer firings for one branch are handled strictly
//! one after another. The kind-specific behaviour lives in a
//! [`TransactionLogic`](logic::TransactionLogic) implementation:
//!
//! - [`client::invite`]: Calling → Proceeding → Completed | Accepted
//! - [`client::non_invite`]: Trying → Proceeding → Completed
//! - [`server::invite`]: Proceeding → Completed → Confirmed, or → Accepted
//! - [`server::non_invite`]: Trying → Proceeding → Completed
//!
//! The [`TransactionManager`] owns every live transaction, routes transport
//! messages to them and reports [`TransactionEvent`]s to its user.

pub mod client;
pub mod data;
pub mod error;
pub mod event;
pub mod key;
pub mod logic;
pub mod manager;
pub mod runner;
pub mod server;
pub mod state;
pub mod timer;
pub mod utils;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sipwire_sip_core::{Message, Method};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use data::TransactionData;
pub use error::{Error, Result};
pub use event::TransactionEvent;
pub use key::TransactionKey;
pub use manager::TransactionManager;
pub use state::{AtomicTransactionState, TransactionState};
pub use timer::{TimerSettings, TimerType};

/// The four transaction state machines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    InviteClient,
    NonInviteClient,
    InviteServer,
    NonInviteServer,
}

impl TransactionKind {
    pub fn for_method(method: &Method, is_server: bool) -> Self {
        match (method == &Method::Invite, is_server) {
            (true, false) => TransactionKind::InviteClient,
            (false, false) => TransactionKind::NonInviteClient,
            (true, true) => TransactionKind::InviteServer,
            (false, true) => TransactionKind::NonInviteServer,
        }
    }

    pub fn is_server(&self) -> bool {
        matches!(self, TransactionKind::InviteServer | TransactionKind::NonInviteServer)
    }
}

/// Commands a transaction's event loop consumes.
#[derive(Debug)]
pub enum InternalTransactionCommand {
    TransitionTo(TransactionState),
    /// A message from the wire, or one the transaction user hands down
    /// (a response on the server side, a 2xx ACK on the client side)
    ProcessMessage(Message),
    Timer(TimerType),
    Terminate,
}

/// Spawn the event loop for `data`, picking the logic from its kind.
pub(crate) fn spawn_transaction_loop(
    data: Arc<TransactionData>,
    cmd_rx: mpsc::Receiver<InternalTransactionCommand>,
) -> JoinHandle<()> {
    match data.kind {
        TransactionKind::InviteClient => tokio::spawn(runner::run_transaction_loop::<_, client::invite::ClientInviteTimerHandles, _>(
            data,
            Arc::new(client::invite::ClientInviteLogic),
            cmd_rx,
        )),
        TransactionKind::NonInviteClient => tokio::spawn(runner::run_transaction_loop::<_, client::non_invite::ClientNonInviteTimerHandles, _>(
            data,
            Arc::new(client::non_invite::ClientNonInviteLogic),
            cmd_rx,
        )),
        TransactionKind::InviteServer => tokio::spawn(runner::run_transaction_loop::<_, server::invite::ServerInviteTimerHandles, _>(
            data,
            Arc::new(server::invite::ServerInviteLogic),
            cmd_rx,
        )),
        TransactionKind::NonInviteServer => tokio::spawn(runner::run_transaction_loop::<_, server::non_invite::ServerNonInviteTimerHandles, _>(
            data,
            Arc::new(server::non_invite::ServerNonInviteLogic),
            cmd_rx,
        )),
    }
}
