//! Server transaction behaviour over a mock transport, on a paused clock.

mod common;

use common::*;
use tokio::time::{sleep, Duration};

use sipwire_dialog_core::transaction::utils::create_response;
use sipwire_dialog_core::transaction::Error;
use sipwire_dialog_core::{TransactionEvent, TransactionKey, TransactionState};
use sipwire_sip_core::{HeaderAccess, Method, Request, StatusCode};

fn new_request_key(events: &[TransactionEvent]) -> TransactionKey {
    events
        .iter()
        .find_map(|e| match e {
            TransactionEvent::NewRequest { transaction_id, .. } => Some(transaction_id.clone()),
            _ => None,
        })
        .expect("no NewRequest event")
}

/// ACK for a 2xx: same dialog identifiers, a branch of its own.
fn ack_for_2xx(invite: &Request, branch: &str) -> Request {
    let mut ack = incoming(Method::Ack, branch, invite.cseq().unwrap().seq);
    ack.to_address_mut().unwrap().set_tag("alice-tag");
    ack
}

#[tokio::test(start_paused = true)]
async fn duplicate_requests_reach_the_application_once() {
    let mut stack = TestStack::new(false);
    let options = incoming(Method::Options, "z9hG4bKdup1", 1);

    for _ in 0..5 {
        stack.deliver(options.clone()).await;
    }

    let events = stack.drain();
    assert_eq!(
        count(&events, |e| matches!(e, TransactionEvent::NewRequest { .. })),
        1
    );
    let key = new_request_key(&events);
    assert!(key.is_server());
    assert_eq!(stack.manager.state(&key).unwrap(), TransactionState::Trying);
    // Absorbed while Trying: nothing to resend yet
    assert!(stack.transport.sent().is_empty());

    stack
        .manager
        .send_response(&key, create_response(&options, StatusCode::OK))
        .await
        .unwrap();
    settle().await;
    assert_eq!(stack.manager.state(&key).unwrap(), TransactionState::Completed);
    assert_eq!(stack.transport.sent_responses(StatusCode::OK).len(), 1);

    // A duplicate in Completed gets the final response again
    stack.deliver(options.clone()).await;
    stack.deliver(options).await;
    assert_eq!(stack.transport.sent_responses(StatusCode::OK).len(), 3);
    assert_eq!(
        count(&stack.drain(), |e| matches!(e, TransactionEvent::NewRequest { .. })),
        0
    );

    // Timer J
    sleep(Duration::from_secs(33)).await;
    assert!(!stack.manager.transaction_exists(&key));
}

#[tokio::test(start_paused = true)]
async fn invite_gets_automatic_trying() {
    let mut stack = TestStack::new(false);
    let invite = incoming(Method::Invite, "z9hG4bKinv1", 1);
    stack.deliver(invite.clone()).await;
    let key = new_request_key(&stack.drain());
    assert_eq!(stack.manager.state(&key).unwrap(), TransactionState::Proceeding);
    assert!(stack.transport.sent_responses(StatusCode::TRYING).is_empty());

    sleep(Duration::from_millis(250)).await;
    let trying = stack.transport.sent_responses(StatusCode::TRYING);
    assert_eq!(trying.len(), 1);
    assert_eq!(trying[0].top_via().and_then(|v| v.branch()), Some("z9hG4bKinv1"));

    // A retransmitted INVITE gets the last provisional response
    stack.deliver(invite).await;
    assert_eq!(stack.transport.sent_responses(StatusCode::TRYING).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn early_provisional_suppresses_trying() {
    let mut stack = TestStack::new(false);
    let invite = incoming(Method::Invite, "z9hG4bKinv2", 1);
    stack.deliver(invite.clone()).await;
    let key = new_request_key(&stack.drain());

    let mut ringing = create_response(&invite, StatusCode::RINGING);
    ringing.to_address_mut().unwrap().set_tag("alice-tag");
    stack.manager.send_response(&key, ringing).await.unwrap();
    sleep(Duration::from_millis(500)).await;

    assert!(stack.transport.sent_responses(StatusCode::TRYING).is_empty());
    assert_eq!(stack.transport.sent_responses(StatusCode::RINGING).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn failure_is_retransmitted_until_ack() {
    let mut stack = TestStack::new(false);
    let invite = incoming(Method::Invite, "z9hG4bKinv3", 1);
    stack.deliver(invite.clone()).await;
    let key = new_request_key(&stack.drain());

    let mut busy = create_response(&invite, StatusCode::BUSY_HERE);
    busy.to_address_mut().unwrap().set_tag("alice-tag");
    stack.manager.send_response(&key, busy).await.unwrap();
    settle().await;
    assert_eq!(stack.manager.state(&key).unwrap(), TransactionState::Completed);

    // Timer G: 500ms, then 1s
    sleep(Duration::from_millis(1600)).await;
    assert_eq!(stack.transport.sent_responses(StatusCode::BUSY_HERE).len(), 3);

    // The ACK for a failure shares the INVITE branch and stays here
    let mut ack = incoming(Method::Ack, "z9hG4bKinv3", 1);
    ack.to_address_mut().unwrap().set_tag("alice-tag");
    stack.deliver(ack.clone()).await;
    assert_eq!(stack.manager.state(&key).unwrap(), TransactionState::Confirmed);
    stack.deliver(ack).await;

    let events = stack.drain();
    assert_eq!(
        count(&events, |e| matches!(
            e,
            TransactionEvent::AckReceived { .. } | TransactionEvent::StrayRequest { .. }
        )),
        0
    );

    // No more retransmissions; Timer I ends the transaction after T4
    sleep(Duration::from_secs(6)).await;
    assert_eq!(stack.transport.sent_responses(StatusCode::BUSY_HERE).len(), 3);
    assert!(!stack.manager.transaction_exists(&key));
}

#[tokio::test(start_paused = true)]
async fn missing_ack_times_out_once() {
    let mut stack = TestStack::new(false);
    let invite = incoming(Method::Invite, "z9hG4bKinv4", 1);
    stack.deliver(invite.clone()).await;
    let key = new_request_key(&stack.drain());

    let mut busy = create_response(&invite, StatusCode::BUSY_HERE);
    busy.to_address_mut().unwrap().set_tag("alice-tag");
    stack.manager.send_response(&key, busy).await.unwrap();

    sleep(Duration::from_secs(40)).await;
    let events = stack.drain();
    assert_eq!(count(&events, |e| matches!(e, TransactionEvent::AckTimeout { .. })), 1);
    assert!(!stack.manager.transaction_exists(&key));
}

#[tokio::test(start_paused = true)]
async fn accepted_invite_delivers_the_2xx_ack_once() {
    let mut stack = TestStack::new(false);
    let invite = incoming(Method::Invite, "z9hG4bKinv5", 1);
    stack.deliver(invite.clone()).await;
    let key = new_request_key(&stack.drain());

    let mut ok = create_response(&invite, StatusCode::OK);
    ok.to_address_mut().unwrap().set_tag("alice-tag");
    stack.manager.send_response(&key, ok).await.unwrap();
    settle().await;
    assert_eq!(stack.manager.state(&key).unwrap(), TransactionState::Accepted);

    // The 2xx is retransmitted until the ACK shows up
    sleep(Duration::from_millis(600)).await;
    assert_eq!(stack.transport.sent_responses(StatusCode::OK).len(), 2);

    let ack = ack_for_2xx(&invite, "z9hG4bKack5");
    stack.deliver(ack.clone()).await;
    stack.deliver(ack).await;

    let events = stack.drain();
    assert_eq!(count(&events, |e| matches!(e, TransactionEvent::AckReceived { .. })), 1);
    assert_eq!(count(&events, |e| matches!(e, TransactionEvent::StrayRequest { .. })), 0);

    sleep(Duration::from_secs(5)).await;
    assert_eq!(stack.transport.sent_responses(StatusCode::OK).len(), 2);

    // Timer L
    sleep(Duration::from_secs(30)).await;
    assert!(!stack.manager.transaction_exists(&key));
}

#[tokio::test(start_paused = true)]
async fn ack_without_transaction_is_stray() {
    let mut stack = TestStack::new(false);
    let invite = incoming(Method::Invite, "z9hG4bKnever", 1);
    stack.deliver(ack_for_2xx(&invite, "z9hG4bKlost")).await;

    let events = stack.drain();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], TransactionEvent::StrayRequest { .. }));
}

#[tokio::test(start_paused = true)]
async fn responding_on_unknown_transaction_is_a_protocol_violation() {
    let stack = TestStack::new(false);
    let options = incoming(Method::Options, "z9hG4bKghost", 1);
    let key = TransactionKey::from_request(&options).unwrap();

    assert!(matches!(
        stack
            .manager
            .send_response(&key, create_response(&options, StatusCode::OK))
            .await,
        Err(Error::ProtocolViolation(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn request_without_branch_is_dropped() {
    let mut stack = TestStack::new(false);
    let text = "OPTIONS sip:alice@192.0.2.1 SIP/2.0\r\n\
        Via: SIP/2.0/UDP 192.0.2.4\r\n\
        From: <sip:bob@biloxi.com>;tag=a6c85cf\r\n\
        To: <sip:alice@atlanta.com>\r\n\
        Call-ID: nobranch@biloxi.com\r\n\
        CSeq: 1 OPTIONS\r\n\
        Content-Length: 0\r\n\r\n";
    let request = sipwire_sip_core::parse_message(text.as_bytes()).unwrap();
    stack.deliver(request).await;

    assert!(stack.drain().is_empty());
    assert_eq!(stack.manager.transaction_count(), 0);
}
