use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

use crate::transaction::error::Error;
use crate::transaction::logic::TransactionLogic;
use crate::transaction::{
    AtomicTransactionState, InternalTransactionCommand, TransactionEvent, TransactionKey, TransactionState,
};

pub trait AsRefState {
    fn as_ref_state(&self) -> &Arc<AtomicTransactionState>;
}

pub trait AsRefKey {
    fn as_ref_key(&self) -> &TransactionKey;
}

pub trait HasTransactionEvents {
    fn get_tu_event_sender(&self) -> mpsc::Sender<TransactionEvent>;
}

pub trait HasCommandSender {
    fn get_self_command_sender(&self) -> mpsc::Sender<InternalTransactionCommand>;
}

/// Event loop shared by every transaction kind.
///
/// Commands are handled one at a time, so a timer firing can never race a
/// message for the same transaction. The loop ends once the transaction
/// reaches `Terminated` (all timers cancelled, `TransactionTerminated`
/// reported) or when every command sender is gone.
pub async fn run_transaction_loop<D, TH, L>(
    data: Arc<D>,
    logic: Arc<L>,
    mut cmd_rx: mpsc::Receiver<InternalTransactionCommand>,
) where
    D: AsRefState + AsRefKey + HasTransactionEvents + HasCommandSender + Send + Sync + 'static,
    TH: Default + Send + Sync + 'static,
    L: TransactionLogic<D, TH>,
{
    let mut timer_handles = TH::default();
    let id = data.as_ref_key().clone();

    debug!(id = %id, kind = ?logic.kind(), "Transaction loop starting");

    let initial = logic.initial_state();
    if initial != TransactionState::Initial {
        transition(&data, logic.as_ref(), &mut timer_handles, initial).await;
    }

    while !data.as_ref_state().get().is_terminated() {
        let Some(command) = cmd_rx.recv().await else {
            debug!(id = %id, "Command channel closed");
            break;
        };
        let current_state = data.as_ref_state().get();

        let outcome = match command {
            InternalTransactionCommand::TransitionTo(state) => Ok(Some(state)),
            InternalTransactionCommand::ProcessMessage(message) => {
                logic
                    .process_message(&data, message, current_state, &mut timer_handles)
                    .await
            }
            InternalTransactionCommand::Timer(timer) => {
                debug!(id = %id, timer = %timer, state = ?current_state, "Timer fired");
                logic
                    .handle_timer(&data, timer, current_state, &mut timer_handles)
                    .await
            }
            InternalTransactionCommand::Terminate => {
                debug!(id = %id, "Terminated on request");
                Ok(Some(TransactionState::Terminated))
            }
        };

        match outcome {
            Ok(Some(next_state)) => transition(&data, logic.as_ref(), &mut timer_handles, next_state).await,
            Ok(None) => {}
            Err(e) => handle_error(&data, logic.as_ref(), &mut timer_handles, e).await,
        }
    }

    logic.cancel_all_specific_timers(&mut timer_handles);
    debug!(id = %id, "Transaction loop ended");

    if data.as_ref_state().get().is_terminated() {
        let _ = data
            .get_tu_event_sender()
            .send(TransactionEvent::TransactionTerminated { transaction_id: id })
            .await;
    }
}

async fn transition<D, TH, L>(data: &Arc<D>, logic: &L, timer_handles: &mut TH, requested: TransactionState)
where
    D: AsRefState + AsRefKey + HasTransactionEvents + HasCommandSender + Send + Sync + 'static,
    TH: Default + Send + Sync + 'static,
    L: TransactionLogic<D, TH>,
{
    let id = data.as_ref_key();
    let events_tx = data.get_tu_event_sender();
    let mut next = Some(requested);

    while let Some(new_state) = next.take() {
        let current_state = data.as_ref_state().get();
        if current_state == new_state {
            trace!(id = %id, state = ?current_state, "Already in requested state");
            return;
        }

        if let Err(e) = AtomicTransactionState::validate_transition(current_state, new_state, logic.kind()) {
            error!(id = %id, error = %e, "Rejected state transition");
            let _ = events_tx
                .send(TransactionEvent::Error {
                    transaction_id: Some(id.clone()),
                    error: e.to_string(),
                })
                .await;
            return;
        }

        debug!(id = %id, from = ?current_state, to = ?new_state, "State transition");
        let previous_state = data.as_ref_state().set(new_state);
        if new_state.is_terminated() {
            logic.cancel_all_specific_timers(timer_handles);
        }

        let _ = events_tx
            .send(TransactionEvent::StateChanged {
                transaction_id: id.clone(),
                previous_state,
                new_state,
            })
            .await;

        match logic
            .on_enter_state(data, new_state, previous_state, timer_handles, data.get_self_command_sender())
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_transport() => {
                report_transport_error(data, &e).await;
                next = Some(TransactionState::Terminated);
            }
            Err(e) => {
                error!(id = %id, error = %e, state = ?new_state, "Failed to enter state");
                let _ = events_tx
                    .send(TransactionEvent::Error {
                        transaction_id: Some(id.clone()),
                        error: e.to_string(),
                    })
                    .await;
            }
        }
    }
}

async fn handle_error<D, TH, L>(data: &Arc<D>, logic: &L, timer_handles: &mut TH, e: Error)
where
    D: AsRefState + AsRefKey + HasTransactionEvents + HasCommandSender + Send + Sync + 'static,
    TH: Default + Send + Sync + 'static,
    L: TransactionLogic<D, TH>,
{
    if e.is_transport() {
        report_transport_error(data, &e).await;
        transition(data, logic, timer_handles, TransactionState::Terminated).await;
        return;
    }

    warn!(id = %data.as_ref_key(), error = %e, "Transaction command failed");
    let _ = data
        .get_tu_event_sender()
        .send(TransactionEvent::Error {
            transaction_id: Some(data.as_ref_key().clone()),
            error: e.to_string(),
        })
        .await;
}

async fn report_transport_error<D>(data: &Arc<D>, e: &Error)
where
    D: AsRefKey + HasTransactionEvents,
{
    error!(id = %data.as_ref_key(), error = %e, "Transport failure, terminating transaction");
    let _ = data
        .get_tu_event_sender()
        .send(TransactionEvent::TransportError {
            transaction_id: data.as_ref_key().clone(),
            error: e.to_string(),
        })
        .await;
}
