//! Transaction timers.
//!
//! Each running timer is a small tokio task that sleeps and then posts an
//! [`InternalTransactionCommand::Timer`] to its transaction's event loop.
//! Keeping the [`JoinHandle`] lets the state machine cancel it; a timer
//! whose command was already queued when it got cancelled is filtered out
//! by the state checks in the transaction logic.

pub mod types;

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::transaction::{InternalTransactionCommand, TransactionKey};

pub use types::{TimerSettings, TimerType};

/// Start `timer`, firing once after `after`.
pub fn start_timer(
    id: &TransactionKey,
    timer: TimerType,
    after: Duration,
    command_tx: mpsc::Sender<InternalTransactionCommand>,
) -> JoinHandle<()> {
    let id = id.clone();
    trace!(id = %id, timer = %timer, interval = ?after, "Starting timer");
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        trace!(id = %id, timer = %timer, "Timer fired");
        let _ = command_tx.send(InternalTransactionCommand::Timer(timer)).await;
    })
}

/// Abort the timer in `slot`, if any.
pub fn cancel_timer(slot: &mut Option<JoinHandle<()>>) {
    if let Some(handle) = slot.take() {
        handle.abort();
    }
}
