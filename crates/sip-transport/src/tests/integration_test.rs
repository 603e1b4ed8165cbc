//! Loopback tests for the UDP and TCP transports.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;

use sipwire_sip_core::prelude::*;

use crate::config::StreamConfig;
use crate::transport::tcp::TcpTransport;
use crate::transport::udp::UdpTransport;
use crate::transport::{Transport, TransportEvent};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

fn options_request(branch: &str) -> Message {
    Request::new(Method::Options, "sip:bob@127.0.0.1".parse().unwrap())
        .with_header(Header::new(
            HeaderName::Via,
            HeaderValue::Via(vec![ViaHeader::new("UDP", Host::domain("127.0.0.1"), None, branch)]),
        ))
        .with_header(Header::new(HeaderName::CallId, HeaderValue::CallId(format!("call-{}", branch))))
        .with_header(Header::new(HeaderName::CSeq, HeaderValue::CSeq(CSeq::new(1, Method::Options))))
        .with_body(bytes::Bytes::new())
        .into()
}

async fn next_message(rx: &mut mpsc::Receiver<TransportEvent>) -> (Message, SocketAddr) {
    loop {
        let event = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for transport event")
            .expect("event channel closed");
        if let TransportEvent::MessageReceived { message, source, .. } = event {
            return (message, source);
        }
    }
}

#[tokio::test]
async fn udp_round_trip() {
    let (a, _a_rx) = UdpTransport::bind(loopback(), None).await.unwrap();
    let (b, mut b_rx) = UdpTransport::bind(loopback(), None).await.unwrap();
    assert!(!a.is_reliable());

    a.send_message(options_request("z9hG4bKudp1"), b.local_addr().unwrap())
        .await
        .unwrap();
    let (message, source) = next_message(&mut b_rx).await;
    assert_eq!(message.branch(), Some("z9hG4bKudp1"));
    assert_eq!(source, a.local_addr().unwrap());

    a.close().await.unwrap();
    assert!(a.is_closed());
    assert!(matches!(
        a.send_message(options_request("z9hG4bKudp2"), b.local_addr().unwrap()).await,
        Err(crate::Error::TransportClosed)
    ));
}

#[tokio::test]
async fn udp_drops_oversized_datagrams() {
    init_tracing();
    let config = StreamConfig::default().with_max_message_size(64);
    let (receiver, mut rx) = UdpTransport::bind_with_config(loopback(), None, &config).await.unwrap();
    let (sender, _rx) = UdpTransport::bind(loopback(), None).await.unwrap();

    sender
        .send_message(options_request("z9hG4bKbig"), receiver.local_addr().unwrap())
        .await
        .unwrap();
    assert!(timeout(Duration::from_millis(200), rx.recv()).await.is_err());
}

#[tokio::test]
async fn tcp_reuses_connection_and_reports_close() {
    init_tracing();
    let (server, mut server_rx) = TcpTransport::bind(loopback(), None, None).await.unwrap();
    let (client, mut client_rx) = TcpTransport::bind(loopback(), None, None).await.unwrap();
    let server_addr = server.local_addr().unwrap();
    assert!(client.is_reliable());

    client.send_message(options_request("z9hG4bKtcp1"), server_addr).await.unwrap();
    client.send_message(options_request("z9hG4bKtcp2"), server_addr).await.unwrap();
    assert_eq!(client.connection_count(), 1);

    let (first, peer) = next_message(&mut server_rx).await;
    let (second, _) = next_message(&mut server_rx).await;
    assert_eq!(first.branch(), Some("z9hG4bKtcp1"));
    assert_eq!(second.branch(), Some("z9hG4bKtcp2"));

    // Replies travel back over the accepted connection
    server.send_message(options_request("z9hG4bKtcp3"), peer).await.unwrap();
    let (reply, _) = next_message(&mut client_rx).await;
    assert_eq!(reply.branch(), Some("z9hG4bKtcp3"));

    client.close().await.unwrap();
    let closed = timeout(Duration::from_secs(5), async {
        loop {
            match server_rx.recv().await {
                Some(TransportEvent::ConnectionClosed { remote, .. }) => return remote,
                Some(_) => continue,
                None => panic!("server events ended"),
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(closed, peer);
}

#[tokio::test]
async fn tcp_oversized_message_closes_connection() {
    init_tracing();
    let config = StreamConfig::default().with_max_message_size(256);
    let (server, mut server_rx) = TcpTransport::bind(loopback(), None, Some(config)).await.unwrap();

    let mut raw = TcpStream::connect(server.local_addr().unwrap()).await.unwrap();
    raw.write_all(b"MESSAGE sip:bob@127.0.0.1 SIP/2.0\r\nCall-ID: big\r\nCSeq: 1 MESSAGE\r\nContent-Length: 100000\r\n\r\n")
        .await
        .unwrap();

    let event = timeout(Duration::from_secs(5), server_rx.recv()).await.unwrap().unwrap();
    match event {
        TransportEvent::ConnectionClosed { reason, .. } => assert!(reason.contains("exceeds")),
        other => panic!("expected connection close, got {:?}", other),
    }
    assert_eq!(server.connection_count(), 0);
}
