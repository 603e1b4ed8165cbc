//! Framing behaviour against scripted streams.
//!
//! `tokio_test` mocks insist on being read to the end, so cases that abort
//! early read from plain byte slices instead.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_test::io::Builder;

use sipwire_sip_core::{HeaderAccess, Message};
use sipwire_sip_transport::{Error, StreamConfig, StreamFramer};

fn message_text(call_id: &str, body: &[u8]) -> Vec<u8> {
    let mut text = format!(
        "MESSAGE sip:bob@biloxi.com SIP/2.0\r\n\
         Via: SIP/2.0/TCP pc33.atlanta.com;branch=z9hG4bK-{call_id}\r\n\
         Call-ID: {call_id}\r\n\
         CSeq: 1 MESSAGE\r\n\
         Content-Type: text/plain\r\n\
         Content-Length: {}\r\n\r\n",
        body.len()
    )
    .into_bytes();
    text.extend_from_slice(body);
    text
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn collect(mut framer: StreamFramer<impl tokio::io::AsyncRead + Unpin + Send>) -> (Vec<Message>, Result<(), Error>) {
    init_tracing();
    let mut messages = Vec::new();
    loop {
        match framer.next_message().await {
            Ok(Some(message)) => messages.push(message),
            Ok(None) => return (messages, Ok(())),
            Err(e) => return (messages, Err(e)),
        }
    }
}

#[tokio::test]
async fn byte_at_a_time_delivery_keeps_boundaries() {
    let mut stream = message_text("one", b"first body");
    stream.extend_from_slice(b"\r\n");
    stream.extend(message_text("two", b"second\r\n\r\nbody with blank line"));

    let mut builder = Builder::new();
    for byte in &stream {
        builder.read(std::slice::from_ref(byte));
    }
    let (messages, result) = collect(StreamFramer::new(builder.build(), StreamConfig::default())).await;

    result.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].call_id(), Some("one"));
    assert_eq!(messages[0].body().as_ref(), b"first body");
    assert_eq!(messages[1].call_id(), Some("two"));
    assert_eq!(messages[1].body().as_ref(), b"second\r\n\r\nbody with blank line");
}

#[tokio::test]
async fn arbitrary_chunking_splits_at_content_length() {
    let mut stream = message_text("a", b"12345");
    stream.extend(message_text("b", b"67"));
    let (head, tail) = stream.split_at(stream.len() / 2 + 3);

    let reader = Builder::new().read(head).read(&tail[..7]).read(&tail[7..]).build();
    let (messages, result) = collect(StreamFramer::new(reader, StreamConfig::default())).await;
    result.unwrap();
    let bodies: Vec<&[u8]> = messages.iter().map(|m| m.body().as_ref()).collect();
    assert_eq!(bodies, [&b"12345"[..], &b"67"[..]]);
}

#[tokio::test]
async fn malformed_message_is_skipped_with_its_body() {
    let mut stream = b"MESSAGE sip:bob@biloxi.com SIP/2.0\r\n\
        CSeq: not-a-number MESSAGE\r\n\
        Content-Length: 9\r\n\r\n\
        INVITE x "
        .to_vec();
    stream.extend(message_text("good", b"ok"));

    let (messages, result) = collect(StreamFramer::new(Builder::new().read(&stream).build(), StreamConfig::default())).await;
    result.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].call_id(), Some("good"));
}

#[tokio::test]
async fn declared_length_over_limit_closes_without_delivery() {
    let config = StreamConfig::default().with_max_message_size(1024);
    let stream = message_text("huge", &[b'x'; 4096]);
    let (tx, mut rx) = mpsc::channel(4);
    let mut sink = tx;

    let result = StreamFramer::new(&stream[..], config)
        .run(&mut sink)
        .await;
    assert!(matches!(result, Err(Error::MessageTooLarge { limit: 1024, .. })));
    drop(sink);
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn unterminated_header_block_hits_size_limit() {
    let config = StreamConfig::default().with_max_message_size(128);
    let mut stream = b"OPTIONS sip:bob@biloxi.com SIP/2.0\r\n".to_vec();
    for i in 0..20 {
        stream.extend(format!("X-Filler-{i}: aaaaaaaa\r\n").into_bytes());
    }
    let (messages, result) = collect(StreamFramer::new(&stream[..], config)).await;
    assert!(messages.is_empty());
    assert!(matches!(result, Err(Error::MessageTooLarge { .. })));
}

#[tokio::test(start_paused = true)]
async fn starvation_guard_covers_body_reads_and_resets_on_progress() {
    let config = StreamConfig::default().with_starvation_timeout(Duration::from_secs(2));
    let text = message_text("slow", b"abcdef");
    let split = text.len() - 6;

    // A steady trickle is fine: each wait is under the guard
    let reader = Builder::new()
        .read(&text[..split])
        .wait(Duration::from_millis(1500))
        .read(&text[split..split + 3])
        .wait(Duration::from_millis(1500))
        .read(&text[split + 3..])
        .build();
    let (messages, result) = collect(StreamFramer::new(reader, config.clone())).await;
    result.unwrap();
    assert_eq!(messages[0].body().as_ref(), b"abcdef");

    // A stall in the middle of the body is not
    let (mut client, server) = tokio::io::duplex(4096);
    tokio::io::AsyncWriteExt::write_all(&mut client, &text[..split + 2]).await.unwrap();
    let mut framer = StreamFramer::new(server, config);
    assert!(matches!(framer.next_message().await, Err(Error::Starvation(_))));
    drop(client);
}
