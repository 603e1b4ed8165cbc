//! INVITE client transaction (RFC 3261 section 17.1.1, RFC 6026).
//!
//! ```text
//!            send_request
//!  Initial ──────────────▶ Calling ──1xx──▶ Proceeding
//!                            │  │               │
//!                  Timer B   │  └────2xx────────┼──▶ Accepted ──Timer M──▶ Terminated
//!               (timeout)    │                  │
//!                            └─────300-699──────┴──▶ Completed ──Timer D──▶ Terminated
//! ```
//!
//! On unreliable transports Timer A retransmits the INVITE at T1, 2·T1,
//! 4·T1, ... capped at T2 while in Calling. The ACK for a 300-699 is built
//! and sent here and resent for every retransmitted final response; the
//! ACK for a 2xx comes from the transaction user through
//! [`TransactionManager::send_ack`](crate::transaction::TransactionManager::send_ack).

use std::sync::Arc;
use std::time::Duration;

use sipwire_sip_core::{HeaderAccess, Message, Method, Request, Response};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::transaction::client::is_repeated_provisional;
use crate::transaction::error::{Error, Result};
use crate::transaction::logic::TransactionLogic;
use crate::transaction::timer::{cancel_timer, start_timer};
use crate::transaction::utils::create_ack_for_non_2xx;
use crate::transaction::{
    InternalTransactionCommand, TimerType, TransactionData, TransactionEvent, TransactionKind, TransactionState,
};

#[derive(Default, Debug)]
pub struct ClientInviteTimerHandles {
    timer_a: Option<JoinHandle<()>>,
    timer_a_interval: Duration,
    timer_b: Option<JoinHandle<()>>,
    timer_d: Option<JoinHandle<()>>,
    timer_m: Option<JoinHandle<()>>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ClientInviteLogic;

impl ClientInviteLogic {
    async fn on_response(
        &self,
        data: &Arc<TransactionData>,
        response: Response,
        current_state: TransactionState,
    ) -> Result<Option<TransactionState>> {
        let id = &data.id;
        let status = response.status();

        match current_state {
            TransactionState::Calling | TransactionState::Proceeding => {
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
                    return Ok((current_state == TransactionState::Calling).then_some(TransactionState::Proceeding));
                }

                if status.is_success() {
                    if let Some(tag) = response.to_tag() {
                        data.accepted_tags.lock().push(tag.to_string());
                    }
                    data.set_last_response(response.clone());
                    data.emit(TransactionEvent::SuccessResponse {
                        transaction_id: id.clone(),
                        response,
                    })
                    .await;
                    return Ok(Some(TransactionState::Accepted));
                }

                let ack = create_ack_for_non_2xx(&data.request(), &response)?;
                data.set_last_response(response.clone());
                data.emit(TransactionEvent::FailureResponse {
                    transaction_id: id.clone(),
                    response,
                })
                .await;
                *data.ack.lock() = Some(ack.clone());
                data.send(Message::Request(ack)).await?;
                Ok(Some(TransactionState::Completed))
            }
            TransactionState::Completed => {
                if status.is_final() && !status.is_success() {
                    debug!(id = %id, status = %status, "Final response retransmitted, resending ACK");
                    self.resend_ack(data).await?;
                }
                Ok(None)
            }
            TransactionState::Accepted => {
                if !status.is_success() {
                    trace!(id = %id, status = %status, "Ignoring non-2xx in Accepted");
                    return Ok(None);
                }
                let tag = response.to_tag().map(str::to_string);
                let seen = {
                    let tags = data.accepted_tags.lock();
                    tag.as_ref().is_some_and(|t| tags.contains(t))
                };
                if seen {
                    trace!(id = %id, "2xx retransmission absorbed");
                    self.resend_ack(data).await?;
                    return Ok(None);
                }
                // A 2xx with a new to-tag comes from another fork
                if let Some(tag) = tag {
                    data.accepted_tags.lock().push(tag);
                }
                data.emit(TransactionEvent::SuccessResponse {
                    transaction_id: id.clone(),
                    response,
                })
                .await;
                Ok(None)
            }
            _ => {
                trace!(id = %id, state = ?current_state, status = %status, "Ignoring response");
                Ok(None)
            }
        }
    }

    async fn on_ack_from_user(
        &self,
        data: &Arc<TransactionData>,
        ack: Request,
        current_state: TransactionState,
    ) -> Result<Option<TransactionState>> {
        if current_state != TransactionState::Accepted {
            return Err(Error::InvalidRequest(format!(
                "ACK for a 2xx can only be sent in Accepted, transaction is {:?}",
                current_state
            )));
        }
        *data.ack.lock() = Some(ack.clone());
        data.send(Message::Request(ack)).await?;
        Ok(None)
    }

    async fn resend_ack(&self, data: &Arc<TransactionData>) -> Result<()> {
        let ack = data.ack.lock().clone();
        if let Some(ack) = ack {
            data.send(Message::Request(ack)).await?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl TransactionLogic<TransactionData, ClientInviteTimerHandles> for ClientInviteLogic {
    fn kind(&self) -> TransactionKind {
        TransactionKind::InviteClient
    }

    fn initial_state(&self) -> TransactionState {
        TransactionState::Initial
    }

    fn cancel_all_specific_timers(&self, timer_handles: &mut ClientInviteTimerHandles) {
        cancel_timer(&mut timer_handles.timer_a);
        cancel_timer(&mut timer_handles.timer_b);
        cancel_timer(&mut timer_handles.timer_d);
        cancel_timer(&mut timer_handles.timer_m);
    }

    async fn on_enter_state(
        &self,
        data: &Arc<TransactionData>,
        new_state: TransactionState,
        _previous_state: TransactionState,
        timer_handles: &mut ClientInviteTimerHandles,
        command_tx: mpsc::Sender<InternalTransactionCommand>,
    ) -> Result<()> {
        let id = &data.id;
        let timers = &data.timer_config;

        match new_state {
            TransactionState::Calling => {
                data.send_request().await?;
                if !data.reliable {
                    timer_handles.timer_a_interval = timers.t1;
                    timer_handles.timer_a = Some(start_timer(id, TimerType::A, timers.t1, command_tx.clone()));
                }
                timer_handles.timer_b = Some(start_timer(id, TimerType::B, timers.transaction_timeout, command_tx));
            }
            TransactionState::Proceeding => {
                cancel_timer(&mut timer_handles.timer_a);
                cancel_timer(&mut timer_handles.timer_b);
            }
            TransactionState::Completed => {
                cancel_timer(&mut timer_handles.timer_a);
                cancel_timer(&mut timer_handles.timer_b);
                let wait = timers.wait_time_d(data.reliable);
                timer_handles.timer_d = Some(start_timer(id, TimerType::D, wait, command_tx));
            }
            TransactionState::Accepted => {
                cancel_timer(&mut timer_handles.timer_a);
                cancel_timer(&mut timer_handles.timer_b);
                timer_handles.timer_m = Some(start_timer(id, TimerType::M, timers.transaction_timeout, command_tx));
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
        _timer_handles: &mut ClientInviteTimerHandles,
    ) -> Result<Option<TransactionState>> {
        match message {
            Message::Response(response) => self.on_response(data, response, current_state).await,
            Message::Request(request) if request.method == Method::Ack => {
                self.on_ack_from_user(data, request, current_state).await
            }
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
        timer_handles: &mut ClientInviteTimerHandles,
    ) -> Result<Option<TransactionState>> {
        let id = &data.id;

        match (timer, current_state) {
            (TimerType::A, TransactionState::Calling) => {
                timer_handles.timer_a.take();
                debug!(id = %id, "Timer A fired, retransmitting INVITE");
                data.retransmit_request().await?;
                let next = data.timer_config.backoff(timer_handles.timer_a_interval);
                timer_handles.timer_a_interval = next;
                timer_handles.timer_a = Some(start_timer(id, TimerType::A, next, data.cmd_tx.clone()));
                Ok(None)
            }
            (TimerType::B, TransactionState::Calling) => {
                timer_handles.timer_b.take();
                warn!(id = %id, "Timer B fired, INVITE timed out");
                data.emit(TransactionEvent::TransactionTimeout {
                    transaction_id: id.clone(),
                })
                .await;
                Ok(Some(TransactionState::Terminated))
            }
            (TimerType::D, TransactionState::Completed) | (TimerType::M, TransactionState::Accepted) => {
                Ok(Some(TransactionState::Terminated))
            }
            _ => {
                trace!(id = %id, timer = %timer, state = ?current_state, "Stale timer ignored");
                Ok(None)
            }
        }
    }
}
