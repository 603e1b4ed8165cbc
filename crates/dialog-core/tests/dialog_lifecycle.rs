//! Dialog creation, in-dialog requests and teardown, driven from the
//! transaction event stream.

mod common;

use common::*;
use tokio::sync::mpsc;
use tokio::time::Duration;
use tokio_test::{assert_err, assert_ok};

use sipwire_dialog_core::transaction::utils::create_response;
use sipwire_dialog_core::{
    DialogError, DialogEvent, DialogId, DialogManager, DialogState, TransactionEvent, TransactionKey,
};
use sipwire_sip_core::{HeaderAccess, Method, Request, StatusCode};

struct DialogStack {
    stack: TestStack,
    dialogs: DialogManager,
    dialog_events: mpsc::Receiver<DialogEvent>,
}

impl DialogStack {
    fn new() -> Self {
        let stack = TestStack::new(false);
        let (dialogs, dialog_events) = DialogManager::new(stack.manager.clone());
        Self {
            stack,
            dialogs,
            dialog_events,
        }
    }

    /// Feed pending transaction events to the dialog layer, returning them
    /// with the dialog layer's verdict on each.
    async fn pump(&mut self) -> Vec<(TransactionEvent, Result<Option<DialogId>, DialogError>)> {
        settle().await;
        let mut results = Vec::new();
        for event in self.stack.drain() {
            let outcome = self.dialogs.process_transaction_event(&event).await;
            results.push((event, outcome));
        }
        results
    }

    fn dialog_events(&mut self) -> Vec<DialogEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.dialog_events.try_recv() {
            events.push(event);
        }
        events
    }

    /// Deliver an incoming request and return its server transaction with
    /// the dialog layer's verdict.
    async fn receive(&mut self, request: Request) -> (TransactionKey, Result<Option<DialogId>, DialogError>) {
        self.stack.deliver(request).await;
        self.pump()
            .await
            .into_iter()
            .find_map(|(event, outcome)| match event {
                TransactionEvent::NewRequest { transaction_id, .. } => Some((transaction_id, outcome)),
                _ => None,
            })
            .expect("request was not reported")
    }

    /// Answer an incoming INVITE with 200 and return the UAS dialog.
    async fn accept_invite(&mut self) -> (Request, DialogId) {
        let invite = incoming(Method::Invite, "z9hG4bKuasinv", 1);
        let (key, outcome) = self.receive(invite.clone()).await;
        assert_eq!(outcome.unwrap(), None);

        let id = self
            .dialogs
            .send_response(&key, create_response(&invite, StatusCode::OK))
            .await
            .unwrap()
            .expect("200 to INVITE creates a dialog");
        settle().await;
        (invite, id)
    }
}

fn in_dialog(method: Method, branch: &str, seq: u32, id: &DialogId) -> Request {
    let mut request = incoming(method, branch, seq);
    request.to_address_mut().unwrap().set_tag(id.local_tag.clone());
    request
}

#[tokio::test(start_paused = true)]
async fn uac_dialog_from_invite_to_bye() {
    let mut ds = DialogStack::new();
    let invite = outgoing(Method::Invite, "z9hG4bKuac1", 1);
    let invite_key = ds
        .stack
        .manager
        .create_client_transaction(invite.clone(), remote_addr())
        .await
        .unwrap();
    ds.stack.manager.send_request(&invite_key).await.unwrap();
    settle().await;

    ds.stack
        .deliver(remote_response(&invite, StatusCode::RINGING, Some("a6c85cf")))
        .await;
    ds.pump().await;

    let id = DialogId::new("a84b4c76e66710@pc33.atlanta.com", "1928301774", "a6c85cf");
    assert_eq!(ds.dialogs.state(&id).await, Some(DialogState::Early));
    assert_eq!(
        ds.dialog_events(),
        vec![DialogEvent::Created {
            dialog_id: id.clone(),
            state: DialogState::Early,
        }]
    );

    ds.stack
        .deliver(remote_response(&invite, StatusCode::OK, Some("a6c85cf")))
        .await;
    ds.pump().await;
    assert_eq!(ds.dialogs.state(&id).await, Some(DialogState::Confirmed));
    assert_eq!(
        ds.dialog_events(),
        vec![DialogEvent::StateChanged {
            dialog_id: id.clone(),
            previous_state: DialogState::Early,
            new_state: DialogState::Confirmed,
        }]
    );

    ds.dialogs.send_ack(&id, &invite_key).await.unwrap();
    settle().await;
    let acks = ds.stack.transport.sent_requests(Method::Ack);
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0].0.cseq().map(|c| c.seq), Some(1));
    assert_ne!(acks[0].0.top_via().and_then(|v| v.branch()), Some("z9hG4bKuac1"));

    let info = ds.dialogs.create_request(&id, Method::Info).await.unwrap();
    assert_eq!(info.cseq().map(|c| c.seq), Some(2));
    assert_eq!(info.call_id(), Some("a84b4c76e66710@pc33.atlanta.com"));

    let bye_key = ds.dialogs.send_request(&id, Method::Bye).await.unwrap();
    settle().await;
    let byes = ds.stack.transport.sent_requests(Method::Bye);
    assert_eq!(byes.len(), 1);
    let bye = &byes[0].0;
    assert_eq!(bye.cseq().map(|c| c.seq), Some(3));
    assert_eq!(bye.to_tag(), Some("a6c85cf"));
    assert_eq!(bye.from_tag(), Some("1928301774"));
    assert_eq!(ds.dialogs.dialog_for_transaction(&bye_key), Some(id.clone()));

    ds.stack
        .deliver(remote_response(bye, StatusCode::OK, Some("a6c85cf")))
        .await;
    ds.pump().await;

    assert_eq!(ds.dialogs.state(&id).await, None);
    assert_eq!(ds.dialogs.dialog_count(), 0);
    let events = ds.dialog_events();
    assert!(events.contains(&DialogEvent::Terminated { dialog_id: id.clone() }));
    assert_eq!(ds.dialogs.dialog_for_transaction(&bye_key), None);
}

#[tokio::test(start_paused = true)]
async fn uas_dialog_checks_remote_cseq() {
    let mut ds = DialogStack::new();
    let (_, id) = ds.accept_invite().await;

    let ok = ds.stack.transport.sent_responses(StatusCode::OK);
    assert_eq!(ok.len(), 1);
    assert_eq!(ok[0].to_tag(), Some(id.local_tag.as_str()));
    assert!(!ok[0].contacts().is_empty());

    let dialog = ds.dialogs.get(&id).await.unwrap();
    assert_eq!(dialog.state, DialogState::Confirmed);
    assert_eq!(dialog.remote_seq, Some(1));
    assert_eq!(id.remote_tag, "a6c85cf");
    assert!(!dialog.is_initiator);

    let (_, outcome) = ds.receive(in_dialog(Method::Info, "z9hG4bKinfo5", 5, &id)).await;
    assert_eq!(assert_ok!(outcome), Some(id.clone()));
    assert_eq!(ds.dialogs.get(&id).await.unwrap().remote_seq, Some(5));

    let (_, outcome) = ds.receive(in_dialog(Method::Info, "z9hG4bKinfo3", 3, &id)).await;
    assert!(assert_err!(outcome).is_protocol_violation());
    assert_eq!(ds.stack.transport.sent_responses(StatusCode::SERVER_INTERNAL_ERROR).len(), 1);
    assert_eq!(ds.dialogs.get(&id).await.unwrap().remote_seq, Some(5));
}

#[tokio::test(start_paused = true)]
async fn request_for_unknown_dialog_gets_481() {
    let mut ds = DialogStack::new();
    let stranger = DialogId::new("3848276298220188511@biloxi.com", "nosuchtag", "a6c85cf");

    let (_, outcome) = ds.receive(in_dialog(Method::Bye, "z9hG4bKlostbye", 2, &stranger)).await;
    let err = assert_err!(outcome);
    assert!(matches!(err, DialogError::DialogNotFound(ref id) if *id == stranger));
    assert_eq!(
        ds.stack
            .transport
            .sent_responses(StatusCode::CALL_OR_TRANSACTION_DOES_NOT_EXIST)
            .len(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn received_bye_terminates_uas_dialog() {
    let mut ds = DialogStack::new();
    let (invite, id) = ds.accept_invite().await;

    // The ACK for the 2xx reaches the dialog layer and changes nothing
    let mut ack = incoming(Method::Ack, "z9hG4bKuasack", 1);
    ack.to_address_mut().unwrap().set_tag(id.local_tag.clone());
    ds.stack.deliver(ack).await;
    let outcomes = ds.pump().await;
    assert!(outcomes.iter().any(|(event, outcome)| matches!(event, TransactionEvent::AckReceived { .. })
        && matches!(outcome, Ok(Some(acked)) if *acked == id)));
    assert_eq!(ds.dialogs.state(&id).await, Some(DialogState::Confirmed));

    let bye = in_dialog(Method::Bye, "z9hG4bKuasbye", invite.cseq().unwrap().seq + 1, &id);
    let (bye_key, outcome) = ds.receive(bye.clone()).await;
    assert_eq!(outcome.unwrap(), Some(id.clone()));

    ds.dialogs
        .send_response(&bye_key, create_response(&bye, StatusCode::OK))
        .await
        .unwrap();

    assert_eq!(ds.dialogs.dialog_count(), 0);
    let events = ds.dialog_events();
    assert_eq!(
        events,
        vec![
            DialogEvent::Created {
                dialog_id: id.clone(),
                state: DialogState::Confirmed,
            },
            DialogEvent::StateChanged {
                dialog_id: id.clone(),
                previous_state: DialogState::Confirmed,
                new_state: DialogState::Terminated,
            },
            DialogEvent::Terminated { dialog_id: id },
        ]
    );
}

/// Send an INVITE and return it with its client transaction.
async fn send_invite(ds: &mut DialogStack, branch: &str) -> (Request, TransactionKey) {
    let invite = outgoing(Method::Invite, branch, 1);
    let key = ds
        .stack
        .manager
        .create_client_transaction(invite.clone(), remote_addr())
        .await
        .unwrap();
    ds.stack.manager.send_request(&key).await.unwrap();
    settle().await;
    (invite, key)
}

#[tokio::test(start_paused = true)]
async fn failure_from_another_fork_ends_the_early_dialog() {
    let mut ds = DialogStack::new();
    let (invite, key) = send_invite(&mut ds, "z9hG4bKfork486").await;

    ds.stack
        .deliver(remote_response(&invite, StatusCode::RINGING, Some("forka")))
        .await;
    ds.pump().await;
    let early = DialogId::new("a84b4c76e66710@pc33.atlanta.com", "1928301774", "forka");
    assert_eq!(ds.dialogs.state(&early).await, Some(DialogState::Early));

    ds.stack
        .deliver(remote_response(&invite, StatusCode::BUSY_HERE, Some("forkb")))
        .await;
    ds.pump().await;

    assert_eq!(ds.dialogs.state(&early).await, None);
    assert_eq!(ds.dialogs.dialog_count(), 0);
    assert!(ds.dialogs.dialogs_for_transaction(&key).is_empty());
    let events = ds.dialog_events();
    assert!(events.contains(&DialogEvent::StateChanged {
        dialog_id: early.clone(),
        previous_state: DialogState::Early,
        new_state: DialogState::Terminated,
    }));
    assert!(events.contains(&DialogEvent::Terminated { dialog_id: early }));
}

#[tokio::test(start_paused = true)]
async fn forked_2xx_ends_unanswered_early_dialog_after_timer_m() {
    let mut ds = DialogStack::new();
    let (invite, key) = send_invite(&mut ds, "z9hG4bKfork200").await;

    ds.stack
        .deliver(remote_response(&invite, StatusCode::RINGING, Some("forka")))
        .await;
    ds.pump().await;
    ds.stack
        .deliver(remote_response(&invite, StatusCode::OK, Some("forkb")))
        .await;
    ds.pump().await;

    let early = DialogId::new("a84b4c76e66710@pc33.atlanta.com", "1928301774", "forka");
    let answered = DialogId::new("a84b4c76e66710@pc33.atlanta.com", "1928301774", "forkb");
    assert_eq!(ds.dialogs.state(&early).await, Some(DialogState::Early));
    assert_eq!(ds.dialogs.state(&answered).await, Some(DialogState::Confirmed));
    assert_eq!(
        ds.dialogs.dialogs_for_transaction(&key),
        vec![early.clone(), answered.clone()]
    );
    ds.dialog_events();

    // Timer M ends the INVITE transaction and the fork that never answered
    tokio::time::sleep(Duration::from_secs(33)).await;
    let outcomes = ds.pump().await;
    assert!(outcomes
        .iter()
        .any(|(event, _)| matches!(event, TransactionEvent::TransactionTerminated { .. })));

    assert_eq!(ds.dialogs.state(&early).await, None);
    assert_eq!(ds.dialogs.state(&answered).await, Some(DialogState::Confirmed));
    assert_eq!(ds.dialogs.dialog_count(), 1);
    assert_eq!(ds.dialogs.dialog_for_transaction(&key), None);
    assert_eq!(
        ds.dialog_events(),
        vec![
            DialogEvent::StateChanged {
                dialog_id: early.clone(),
                previous_state: DialogState::Early,
                new_state: DialogState::Terminated,
            },
            DialogEvent::Terminated { dialog_id: early },
        ]
    );
}
