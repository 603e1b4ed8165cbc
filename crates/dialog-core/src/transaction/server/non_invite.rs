//! Non-INVITE server transaction (RFC 3261 section 17.2.2).
//!
//! Request retransmissions are absorbed while in Trying and answered with
//! the last response afterwards. Timer J keeps the transaction around in
//! Completed long enough to catch every retransmission.

use std::sync::Arc;

use sipwire_sip_core::{Message, Response};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::transaction::error::{Error, Result};
use crate::transaction::logic::TransactionLogic;
use crate::transaction::timer::{cancel_timer, start_timer};
use crate::transaction::{
    InternalTransactionCommand, TimerType, TransactionData, TransactionKind, TransactionState,
};

#[derive(Default, Debug)]
pub struct ServerNonInviteTimerHandles {
    timer_j: Option<JoinHandle<()>>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ServerNonInviteLogic;

impl ServerNonInviteLogic {
    async fn on_response(
        &self,
        data: &Arc<TransactionData>,
        response: Response,
        current_state: TransactionState,
    ) -> Result<Option<TransactionState>> {
        let status = response.status();
        if !matches!(current_state, TransactionState::Trying | TransactionState::Proceeding) {
            return Err(Error::ProtocolViolation(format!(
                "cannot send {} in {:?} state of a non-INVITE server transaction",
                status, current_state
            )));
        }

        data.set_last_response(response.clone());
        data.send(Message::Response(response)).await?;
        if status.is_provisional() {
            Ok(Some(TransactionState::Proceeding))
        } else {
            Ok(Some(TransactionState::Completed))
        }
    }
}

#[async_trait::async_trait]
impl TransactionLogic<TransactionData, ServerNonInviteTimerHandles> for ServerNonInviteLogic {
    fn kind(&self) -> TransactionKind {
        TransactionKind::NonInviteServer
    }

    fn initial_state(&self) -> TransactionState {
        TransactionState::Trying
    }

    fn cancel_all_specific_timers(&self, timer_handles: &mut ServerNonInviteTimerHandles) {
        cancel_timer(&mut timer_handles.timer_j);
    }

    async fn on_enter_state(
        &self,
        data: &Arc<TransactionData>,
        new_state: TransactionState,
        _previous_state: TransactionState,
        timer_handles: &mut ServerNonInviteTimerHandles,
        command_tx: mpsc::Sender<InternalTransactionCommand>,
    ) -> Result<()> {
        if new_state == TransactionState::Completed {
            let wait = data.timer_config.wait_time_j(data.reliable);
            timer_handles.timer_j = Some(start_timer(&data.id, TimerType::J, wait, command_tx));
        }
        Ok(())
    }

    async fn process_message(
        &self,
        data: &Arc<TransactionData>,
        message: Message,
        current_state: TransactionState,
        _timer_handles: &mut ServerNonInviteTimerHandles,
    ) -> Result<Option<TransactionState>> {
        match message {
            Message::Response(response) => self.on_response(data, response, current_state).await,
            Message::Request(_) => {
                match current_state {
                    TransactionState::Proceeding | TransactionState::Completed => {
                        debug!(id = %data.id, state = ?current_state, "Request retransmission, resending last response");
                        data.resend_last_response().await?;
                    }
                    _ => trace!(id = %data.id, "Request retransmission absorbed"),
                }
                Ok(None)
            }
        }
    }

    async fn handle_timer(
        &self,
        data: &Arc<TransactionData>,
        timer: TimerType,
        current_state: TransactionState,
        _timer_handles: &mut ServerNonInviteTimerHandles,
    ) -> Result<Option<TransactionState>> {
        match (timer, current_state) {
            (TimerType::J, TransactionState::Completed) => Ok(Some(TransactionState::Terminated)),
            _ => {
                trace!(id = %data.id, timer = %timer, state = ?current_state, "Stale timer ignored");
                Ok(None)
            }
        }
    }
}
