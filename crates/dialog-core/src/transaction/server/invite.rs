//! INVITE server transaction (RFC 3261 section 17.2.1, RFC 6026).
//!
//! ```text
//!  Proceeding ──300-699──▶ Completed ──ACK──▶ Confirmed ──Timer I──▶ Terminated
//!      │                      │
//!      │                      └──Timer H (no ACK)──▶ Terminated
//!      └──────2xx──────▶ Accepted ──Timer L──▶ Terminated
//! ```
//!
//! A `100 Trying` goes out on its own if the transaction user has not
//! answered within the trying delay. Retransmitted INVITEs get the last
//! response again. The ACK for a 300-699 is absorbed here; the first ACK
//! for a 2xx is handed to the transaction user.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use sipwire_sip_core::{Message, Method, Request, Response, StatusCode};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::transaction::error::{Error, Result};
use crate::transaction::logic::TransactionLogic;
use crate::transaction::timer::{cancel_timer, start_timer};
use crate::transaction::utils::create_response;
use crate::transaction::{
    InternalTransactionCommand, TimerType, TransactionData, TransactionEvent, TransactionKind, TransactionState,
};

#[derive(Default, Debug)]
pub struct ServerInviteTimerHandles {
    timer_trying: Option<JoinHandle<()>>,
    timer_g: Option<JoinHandle<()>>,
    timer_g_interval: Duration,
    timer_h: Option<JoinHandle<()>>,
    timer_i: Option<JoinHandle<()>>,
    timer_l: Option<JoinHandle<()>>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ServerInviteLogic;

impl ServerInviteLogic {
    async fn on_request(
        &self,
        data: &Arc<TransactionData>,
        request: Request,
        current_state: TransactionState,
        timer_handles: &mut ServerInviteTimerHandles,
    ) -> Result<Option<TransactionState>> {
        let id = &data.id;

        if request.method == Method::Ack {
            return match current_state {
                TransactionState::Completed => {
                    debug!(id = %id, "ACK for final response received");
                    Ok(Some(TransactionState::Confirmed))
                }
                TransactionState::Accepted => {
                    if !data.ack_received.swap(true, Ordering::SeqCst) {
                        cancel_timer(&mut timer_handles.timer_g);
                        data.emit(TransactionEvent::AckReceived {
                            transaction_id: id.clone(),
                            request,
                        })
                        .await;
                    } else {
                        trace!(id = %id, "ACK retransmission absorbed");
                    }
                    Ok(None)
                }
                _ => {
                    trace!(id = %id, state = ?current_state, "ACK absorbed");
                    Ok(None)
                }
            };
        }

        match current_state {
            TransactionState::Proceeding | TransactionState::Completed => {
                if data.resend_last_response().await? {
                    debug!(id = %id, state = ?current_state, "INVITE retransmission, resent last response");
                } else {
                    trace!(id = %id, "INVITE retransmission before any response");
                }
            }
            _ => trace!(id = %id, state = ?current_state, "INVITE retransmission absorbed"),
        }
        Ok(None)
    }

    async fn on_response(
        &self,
        data: &Arc<TransactionData>,
        response: Response,
        current_state: TransactionState,
        timer_handles: &mut ServerInviteTimerHandles,
    ) -> Result<Option<TransactionState>> {
        let status = response.status();

        match current_state {
            TransactionState::Proceeding => {
                cancel_timer(&mut timer_handles.timer_trying);
                data.set_last_response(response.clone());
                data.send(Message::Response(response)).await?;
                if status.is_provisional() {
                    Ok(None)
                } else if status.is_success() {
                    Ok(Some(TransactionState::Accepted))
                } else {
                    Ok(Some(TransactionState::Completed))
                }
            }
            // 2xx retransmissions, or 2xx from other forks, pass through
            TransactionState::Accepted if status.is_success() => {
                data.set_last_response(response.clone());
                data.send(Message::Response(response)).await?;
                Ok(None)
            }
            _ => Err(Error::ProtocolViolation(format!(
                "cannot send {} in {:?} state of an INVITE server transaction",
                status, current_state
            ))),
        }
    }
}

#[async_trait::async_trait]
impl TransactionLogic<TransactionData, ServerInviteTimerHandles> for ServerInviteLogic {
    fn kind(&self) -> TransactionKind {
        TransactionKind::InviteServer
    }

    fn initial_state(&self) -> TransactionState {
        TransactionState::Proceeding
    }

    fn cancel_all_specific_timers(&self, timer_handles: &mut ServerInviteTimerHandles) {
        cancel_timer(&mut timer_handles.timer_trying);
        cancel_timer(&mut timer_handles.timer_g);
        cancel_timer(&mut timer_handles.timer_h);
        cancel_timer(&mut timer_handles.timer_i);
        cancel_timer(&mut timer_handles.timer_l);
    }

    async fn on_enter_state(
        &self,
        data: &Arc<TransactionData>,
        new_state: TransactionState,
        _previous_state: TransactionState,
        timer_handles: &mut ServerInviteTimerHandles,
        command_tx: mpsc::Sender<InternalTransactionCommand>,
    ) -> Result<()> {
        let id = &data.id;
        let timers = &data.timer_config;

        match new_state {
            TransactionState::Proceeding => {
                timer_handles.timer_trying =
                    Some(start_timer(id, TimerType::Trying, timers.trying_delay, command_tx));
            }
            TransactionState::Completed => {
                cancel_timer(&mut timer_handles.timer_trying);
                if !data.reliable {
                    timer_handles.timer_g_interval = timers.t1;
                    timer_handles.timer_g = Some(start_timer(id, TimerType::G, timers.t1, command_tx.clone()));
                }
                timer_handles.timer_h = Some(start_timer(id, TimerType::H, timers.transaction_timeout, command_tx));
            }
            TransactionState::Accepted => {
                cancel_timer(&mut timer_handles.timer_trying);
                if !data.reliable {
                    timer_handles.timer_g_interval = timers.t1;
                    timer_handles.timer_g = Some(start_timer(id, TimerType::G, timers.t1, command_tx.clone()));
                }
                timer_handles.timer_l = Some(start_timer(id, TimerType::L, timers.transaction_timeout, command_tx));
            }
            TransactionState::Confirmed => {
                cancel_timer(&mut timer_handles.timer_g);
                cancel_timer(&mut timer_handles.timer_h);
                let wait = timers.wait_time_i(data.reliable);
                timer_handles.timer_i = Some(start_timer(id, TimerType::I, wait, command_tx));
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
        timer_handles: &mut ServerInviteTimerHandles,
    ) -> Result<Option<TransactionState>> {
        match message {
            Message::Request(request) => self.on_request(data, request, current_state, timer_handles).await,
            Message::Response(response) => self.on_response(data, response, current_state, timer_handles).await,
        }
    }

    async fn handle_timer(
        &self,
        data: &Arc<TransactionData>,
        timer: TimerType,
        current_state: TransactionState,
        timer_handles: &mut ServerInviteTimerHandles,
    ) -> Result<Option<TransactionState>> {
        let id = &data.id;

        match (timer, current_state) {
            (TimerType::Trying, TransactionState::Proceeding) => {
                timer_handles.timer_trying.take();
                if data.last_response().is_none() {
                    debug!(id = %id, "No answer yet, sending 100 Trying");
                    let trying = create_response(&data.request(), StatusCode::TRYING);
                    data.set_last_response(trying.clone());
                    data.send(Message::Response(trying)).await?;
                }
                Ok(None)
            }
            (TimerType::G, TransactionState::Completed | TransactionState::Accepted) => {
                timer_handles.timer_g.take();
                if current_state == TransactionState::Accepted && data.ack_received.load(Ordering::SeqCst) {
                    return Ok(None);
                }
                debug!(id = %id, state = ?current_state, "Timer G fired, retransmitting final response");
                data.resend_last_response().await?;
                let next = data.timer_config.backoff(timer_handles.timer_g_interval);
                timer_handles.timer_g_interval = next;
                timer_handles.timer_g = Some(start_timer(id, TimerType::G, next, data.cmd_tx.clone()));
                Ok(None)
            }
            (TimerType::H, TransactionState::Completed) => {
                timer_handles.timer_h.take();
                warn!(id = %id, "Timer H fired, no ACK for final response");
                data.emit(TransactionEvent::AckTimeout {
                    transaction_id: id.clone(),
                })
                .await;
                Ok(Some(TransactionState::Terminated))
            }
            (TimerType::I, TransactionState::Confirmed) | (TimerType::L, TransactionState::Accepted) => {
                Ok(Some(TransactionState::Terminated))
            }
            _ => {
                trace!(id = %id, timer = %timer, state = ?current_state, "Stale timer ignored");
                Ok(None)
            }
        }
    }
}
