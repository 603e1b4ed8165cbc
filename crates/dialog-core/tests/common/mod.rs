//! Shared fixtures: a recording mock transport and message builders.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};

use sipwire_dialog_core::transaction::utils::{create_request, create_response, via_for_transport};
use sipwire_dialog_core::{TransactionEvent, TransactionManager};
use sipwire_sip_core::types::ContactValue;
use sipwire_sip_core::{
    Address, Header, HeaderAccess, HeaderName, HeaderValue, Message, Method, Request, Response, StatusCode, Uri,
};
use sipwire_sip_transport::{Error as TransportError, Transport, TransportEvent};

pub const LOCAL: &str = "192.0.2.1:5060";
pub const REMOTE: &str = "192.0.2.4:5060";

pub fn local_addr() -> SocketAddr {
    LOCAL.parse().unwrap()
}

pub fn remote_addr() -> SocketAddr {
    REMOTE.parse().unwrap()
}

/// Transport that records what it is asked to send.
#[derive(Debug)]
pub struct MockTransport {
    sent: Mutex<Vec<(Message, SocketAddr, Instant)>>,
    reliable: bool,
    fail_writes: AtomicBool,
    closed: AtomicBool,
}

impl MockTransport {
    pub fn new(reliable: bool) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            reliable,
            fail_writes: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(Message, SocketAddr, Instant)> {
        self.sent.lock().clone()
    }

    pub fn sent_requests(&self, method: Method) -> Vec<(Request, Instant)> {
        self.sent
            .lock()
            .iter()
            .filter_map(|(msg, _, at)| match msg {
                Message::Request(req) if req.method == method => Some((req.clone(), *at)),
                _ => None,
            })
            .collect()
    }

    pub fn sent_responses(&self, status: StatusCode) -> Vec<Response> {
        self.sent
            .lock()
            .iter()
            .filter_map(|(msg, _, _)| match msg {
                Message::Response(resp) if resp.status() == status => Some(resp.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(local_addr())
    }

    async fn send_message(&self, message: Message, destination: SocketAddr) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::TransportClosed);
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed(
                destination,
                std::io::Error::new(std::io::ErrorKind::ConnectionReset, "connection reset"),
            ));
        }
        self.sent.lock().push((message, destination, Instant::now()));
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn is_reliable(&self) -> bool {
        self.reliable
    }
}

/// A transaction manager over a mock transport, plus the channel used to
/// feed it incoming messages.
pub struct TestStack {
    pub transport: Arc<MockTransport>,
    pub inject: mpsc::Sender<TransportEvent>,
    pub manager: TransactionManager,
    pub events: mpsc::Receiver<TransactionEvent>,
}

/// Route stack logs to the test harness; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

impl TestStack {
    pub fn new(reliable: bool) -> Self {
        init_tracing();
        let transport = Arc::new(MockTransport::new(reliable));
        let (inject, transport_rx) = mpsc::channel(100);
        let (manager, events) = TransactionManager::new(transport.clone(), transport_rx, Some(1000));
        Self {
            transport,
            inject,
            manager,
            events,
        }
    }

    /// Deliver `message` as if it arrived from the remote end.
    pub async fn deliver(&self, message: impl Into<Message>) {
        self.inject
            .send(TransportEvent::MessageReceived {
                message: message.into(),
                source: remote_addr(),
                destination: local_addr(),
            })
            .await
            .unwrap();
        settle().await;
    }

    /// Every event reported so far.
    pub fn drain(&mut self) -> Vec<TransactionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Let spawned tasks run. With a paused clock this returns once every
/// task is idle.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub fn alice() -> Address {
    Address::new("sip:alice@atlanta.com".parse().unwrap()).with_display_name("Alice")
}

pub fn bob() -> Address {
    Address::new("sip:bob@biloxi.com".parse().unwrap()).with_display_name("Bob")
}

fn contact(uri: &str) -> Header {
    let uri: Uri = uri.parse().unwrap();
    Header::new(
        HeaderName::Contact,
        HeaderValue::Contact(ContactValue::Addresses(vec![Address::new(uri)])),
    )
}

/// Request we send to REMOTE.
pub fn outgoing(method: Method, branch: &str, seq: u32) -> Request {
    let via = via_for_transport(local_addr(), false, branch);
    let mut request = create_request(
        method,
        "sip:bob@192.0.2.4".parse().unwrap(),
        alice().with_tag("1928301774"),
        bob(),
        "a84b4c76e66710@pc33.atlanta.com",
        seq,
        via,
    );
    request.push_header(contact("sip:alice@192.0.2.1"));
    request
}

/// Request REMOTE sends us.
pub fn incoming(method: Method, branch: &str, seq: u32) -> Request {
    let via = via_for_transport(remote_addr(), false, branch);
    let mut request = create_request(
        method,
        "sip:alice@192.0.2.1".parse().unwrap(),
        bob().with_tag("a6c85cf"),
        alice(),
        "3848276298220188511@biloxi.com",
        seq,
        via,
    );
    request.push_header(contact("sip:bob@192.0.2.4"));
    request
}

/// Response REMOTE sends to a request of ours.
pub fn remote_response(request: &Request, status: StatusCode, to_tag: Option<&str>) -> Response {
    let mut response = create_response(request, status);
    if let (Some(tag), Some(to)) = (to_tag, response.to_address_mut()) {
        to.set_tag(tag);
    }
    response.push_header(contact("sip:bob@192.0.2.4"));
    response
}

/// Offsets of `instants` from `start`, in milliseconds.
pub fn offsets_ms(start: Instant, instants: &[Instant]) -> Vec<u128> {
    instants.iter().map(|at| at.duration_since(start).as_millis()).collect()
}

pub fn count<F>(events: &[TransactionEvent], predicate: F) -> usize
where
    F: Fn(&TransactionEvent) -> bool,
{
    events.iter().filter(|event| predicate(event)).count()
}
