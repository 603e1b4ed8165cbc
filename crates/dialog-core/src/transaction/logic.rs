use std::sync::Arc;

use sipwire_sip_core::Message;
use tokio::sync::mpsc;

use crate::transaction::error::Result;
use crate::transaction::{InternalTransactionCommand, TimerType, TransactionKind, TransactionState};

/// Kind-specific behaviour of a transaction, driven by the generic loop in
/// [`run_transaction_loop`](crate::transaction::runner::run_transaction_loop).
///
/// - `D` is the shared transaction data.
/// - `TH` holds the kind's timer handles; it is owned by the loop and
///   handed to every callback, so only the loop ever touches it.
///
/// Callbacks that return `Ok(Some(state))` ask the loop to move to
/// `state`. A transport error returned from any callback terminates the
/// transaction.
#[async_trait::async_trait]
pub trait TransactionLogic<D, TH>: Send + Sync + 'static
where
    D: Send + Sync + 'static,
    TH: Default + Send + Sync + 'static,
{
    fn kind(&self) -> TransactionKind;

    /// State entered as soon as the loop starts. Client transactions stay
    /// in `Initial` until their request is sent.
    fn initial_state(&self) -> TransactionState;

    /// Handle a message: one received for this transaction, or one the
    /// transaction user wants sent through it.
    async fn process_message(
        &self,
        data: &Arc<D>,
        message: Message,
        current_state: TransactionState,
        timer_handles: &mut TH,
    ) -> Result<Option<TransactionState>>;

    async fn handle_timer(
        &self,
        data: &Arc<D>,
        timer: TimerType,
        current_state: TransactionState,
        timer_handles: &mut TH,
    ) -> Result<Option<TransactionState>>;

    /// Start the timers (and send the messages) that come with entering
    /// `new_state`, and stop the ones that no longer apply.
    async fn on_enter_state(
        &self,
        data: &Arc<D>,
        new_state: TransactionState,
        previous_state: TransactionState,
        timer_handles: &mut TH,
        command_tx: mpsc::Sender<InternalTransactionCommand>,
    ) -> Result<()>;

    fn cancel_all_specific_timers(&self, timer_handles: &mut TH);
}
