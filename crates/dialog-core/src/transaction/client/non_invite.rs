//! Non-INVITE client transaction (RFC 3261 section 17.1.2).
//!
//! Timer E retransmits the request (unreliable transports only), doubling
//! up to T2 while in Trying and at a flat T2 once a provisional response
//! has arrived. Timer F bounds the whole transaction; Timer K absorbs
//! response retransmissions after the final response.

use std::sync::Arc;
use std::time::Duration;

use sipwire_sip_core::{Message, Response};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::transaction::client::is_repeated_provisional;
use crate::transaction::error::Result;
use crate::transaction::logic::TransactionLogic;
use crate::transaction::timer::{cancel_timer, start_timer};
use crate::transaction::{
    InternalTransactionCommand, TimerType, TransactionData, TransactionEvent, TransactionKind, TransactionState,
};

#[derive(Default, Debug)]
pub struct ClientNonInviteTimerHandles {
    timer_e: Option<JoinHandle<()>>,
    timer_e_interval: Duration,
    timer_f: Option<JoinHandle<()>>,
    timer_k: Option<JoinHandle<()>>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ClientNonInviteLogic;

impl ClientNonInviteLogic {
    async fn on_response(
        &self,
        data: &Arc<TransactionData>,
        response: Response,
        current_state: TransactionState,
    ) -> Result<Option<TransactionState>> {
        let id = &data.id;
        let status = response.status();

        if !matches!(current_state, TransactionState::Trying | TransactionState::Proceeding) {
            trace!(id = %id, state = ?current_state, status = %status, "Response retransmission absorbed");
            return Ok(None);
        }

        if status.is_provisional() {
            if is_repeated_provisional(data, &response) {
                trace!(id = %id, status = %status, "Absorbed provisional retransmission");
                return Ok(None);
            }
            data.set_last_response(response.clone());
            data.emit(TransactionEvent::ProvisionalResponse {
                transaction_id: id.clone(),
                response,
            })
            .await;
            return Ok(Some(TransactionState::Proceeding));
        }

        data.set_last_response(response.clone());
        let event = if status.is_success() {
            TransactionEvent::SuccessResponse {
                transaction_id: id.clone(),
                response,
            }
        } else {
            TransactionEvent::FailureResponse {
                transaction_id: id.clone(),
                response,
            }
        };
        data.emit(event).await;
        Ok(Some(TransactionState::Completed))
    }
}

#[async_trait::async_trait]
impl TransactionLogic<TransactionData, ClientNonInviteTimerHandles> for ClientNonInviteLogic {
    fn kind(&self) -> TransactionKind {
        TransactionKind::NonInviteClient
    }

    fn initial_state(&self) -> TransactionState {
        TransactionState::Initial
    }

    fn cancel_all_specific_timers(&self, timer_handles: &mut ClientNonInviteTimerHandles) {
        cancel_timer(&mut timer_handles.timer_e);
        cancel_timer(&mut timer_handles.timer_f);
        cancel_timer(&mut timer_handles.timer_k);
    }

    async fn on_enter_state(
        &self,
        data: &Arc<TransactionData>,
        new_state: TransactionState,
        _previous_state: TransactionState,
        timer_handles: &mut ClientNonInviteTimerHandles,
        command_tx: mpsc::Sender<InternalTransactionCommand>,
    ) -> Result<()> {
        let id = &data.id;
        let timers = &data.timer_config;

        match new_state {
            TransactionState::Trying => {
                data.send_request().await?;
                if !data.reliable {
                    timer_handles.timer_e_interval = timers.t1;
                    timer_handles.timer_e = Some(start_timer(id, TimerType::E, timers.t1, command_tx.clone()));
                }
                timer_handles.timer_f = Some(start_timer(id, TimerType::F, timers.transaction_timeout, command_tx));
            }
            TransactionState::Completed => {
                cancel_timer(&mut timer_handles.timer_e);
                cancel_timer(&mut timer_handles.timer_f);
                let wait = timers.wait_time_k(data.reliable);
                timer_handles.timer_k = Some(start_timer(id, TimerType::K, wait, command_tx));
            }
            _ => {}
        }
        Ok(())
    }

    async fn process_message(
        &self,
        data: &Arc<TransactionData>,
        message: Message,
        current_state: TransactionState,
        _timer_handles: &mut ClientNonInviteTimerHandles,
    ) -> Result<Option<TransactionState>> {
        match message {
            Message::Response(response) => self.on_response(data, response, current_state).await,
            Message::Request(request) => {
                warn!(id = %data.id, method = %request.method, "Client transaction got a request, ignoring");
                Ok(None)
            }
        }
    }

    async fn handle_timer(
        &self,
        data: &Arc<TransactionData>,
        timer: TimerType,
        current_state: TransactionState,
        timer_handles: &mut ClientNonInviteTimerHandles,
    ) -> Result<Option<TransactionState>> {
        let id = &data.id;

        match (timer, current_state) {
            (TimerType::E, TransactionState::Trying | TransactionState::Proceeding) => {
                timer_handles.timer_e.take();
                debug!(id = %id, state = ?current_state, "Timer E fired, retransmitting request");
                data.retransmit_request().await?;
                let next = if current_state == TransactionState::Proceeding {
                    data.timer_config.t2
                } else {
                    data.timer_config.backoff(timer_handles.timer_e_interval)
                };
                timer_handles.timer_e_interval = next;
                timer_handles.timer_e = Some(start_timer(id, TimerType::E, next, data.cmd_tx.clone()));
                Ok(None)
            }
            (TimerType::F, TransactionState::Trying | TransactionState::Proceeding) => {
                timer_handles.timer_f.take();
                warn!(id = %id, "Timer F fired, request timed out");
                data.emit(TransactionEvent::TransactionTimeout {
                    transaction_id: id.clone(),
                })
                .await;
                Ok(Some(TransactionState::Terminated))
            }
            (TimerType::K, TransactionState::Completed) => Ok(Some(TransactionState::Terminated)),
            _ => {
                trace!(id = %id, timer = %timer, state = ?current_state, "Stale timer ignored");
                Ok(None)
            }
        }
    }
}
