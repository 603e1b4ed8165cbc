//! Message-level parser tests over a small corpus of RFC 3261 / RFC 4475
//! style messages.

use bytes::Bytes;
use sipwire_sip_core::prelude::*;
use sipwire_sip_core::types::EventType;

const REGISTER: &str = "REGISTER sip:registrar.biloxi.com SIP/2.0\r\n\
Via: SIP/2.0/UDP bobspc.biloxi.com:5060;branch=z9hG4bKnashds7\r\n\
Max-Forwards: 70\r\n\
To: Bob <sip:bob@biloxi.com>\r\n\
From: Bob <sip:bob@biloxi.com>;tag=456248\r\n\
Call-ID: 843817637684230@998sdasdh09\r\n\
CSeq: 1826 REGISTER\r\n\
Contact: <sip:bob@192.0.2.4>\r\n\
Expires: 7200\r\n\
Content-Length: 0\r\n\
\r\n";

const COMPACT_NOTIFY: &str = "NOTIFY sip:alice@pc33.atlanta.com SIP/2.0\r\n\
v: SIP/2.0/TCP server.example.com;branch=z9hG4bK-d8754z\r\n\
f: <sip:presence@example.com>;tag=ffd2\r\n\
t: \"Alice\" <sip:alice@atlanta.com>;tag=xfg9\r\n\
i: 0a3b-11\r\n\
CSeq: 2 NOTIFY\r\n\
o: presence;id=17\r\n\
u: presence, dialog\r\n\
k: eventlist\r\n\
s: status update\r\n\
c: application/pidf+xml\r\n\
X-Vendor-Trace: 3f 2a ; opaque\r\n\
l: 5\r\n\
\r\n\
<a/>\n";

const RESPONSE_180: &str = "SIP/2.0 180 Ringing\r\n\
Via: SIP/2.0/UDP server10.biloxi.com;branch=z9hG4bK4b43c2ff8.1;received=192.0.2.3,\r\n \
SIP/2.0/UDP bigbox3.site3.atlanta.com;branch=z9hG4bK77ef4c2312983.1\r\n\
Record-Route: <sip:server10.biloxi.com;lr>, <sip:bigbox3.site3.atlanta.com;lr>\r\n\
To: Bob <sip:bob@biloxi.com>;tag=a6c85cf\r\n\
From: Alice <sip:alice@atlanta.com>;tag=1928301774\r\n\
Call-ID: a84b4c76e66710\r\n\
Contact: <sip:bob@192.0.2.4>\r\n\
CSeq: 314159 INVITE\r\n\
Content-Length: 0\r\n\
\r\n";

#[test]
fn register_request_fields() {
    let msg = parse_message(REGISTER.as_bytes()).unwrap();
    let req = msg.as_request().unwrap();
    assert_eq!(req.method, Method::Register);
    assert_eq!(req.uri.host, Host::Domain("registrar.biloxi.com".into()));
    assert_eq!(msg.max_forwards(), Some(70));
    assert_eq!(msg.from_tag(), Some("456248"));
    assert_eq!(msg.to_tag(), None);
    assert_eq!(msg.contacts().len(), 1);
    assert_eq!(msg.content_length(), Some(0));
    assert!(msg.body().is_empty());
}

#[test]
fn compact_forms_resolve_to_canonical_names() {
    let msg = parse_message(COMPACT_NOTIFY.as_bytes()).unwrap();
    let names: Vec<String> = msg.headers().iter().map(|h| h.name.to_string()).collect();
    assert_eq!(
        names,
        [
            "Via",
            "From",
            "To",
            "Call-ID",
            "CSeq",
            "Event",
            "Allow-Events",
            "Supported",
            "Subject",
            "Content-Type",
            "X-Vendor-Trace",
            "Content-Length",
        ]
    );
    let event = msg.header(&HeaderName::Event).unwrap();
    match &event.value {
        HeaderValue::Event(EventType { package, .. }) => assert_eq!(package, "presence"),
        other => panic!("unexpected {:?}", other),
    }
    let vendor = msg.header(&HeaderName::Other("X-Vendor-Trace".into())).unwrap();
    assert_eq!(vendor.value, HeaderValue::Raw("3f 2a ; opaque".into()));
    assert_eq!(msg.body().as_ref(), b"<a/>\n");
}

#[test]
fn response_with_folded_via_list() {
    let msg = parse_message(RESPONSE_180.as_bytes()).unwrap();
    let resp = msg.as_response().unwrap();
    assert_eq!(resp.status, StatusCode::RINGING);
    let vias = msg.vias();
    assert_eq!(vias.len(), 2);
    assert_eq!(vias[0].received(), Some("192.0.2.3"));
    assert_eq!(msg.record_route().len(), 2);
    assert_eq!(msg.to_tag(), Some("a6c85cf"));
}

#[test]
fn encoding_then_decoding_preserves_order_and_values() {
    for text in [REGISTER, COMPACT_NOTIFY, RESPONSE_180] {
        let first = parse_message(text.as_bytes()).unwrap();
        let second = parse_message(&first.to_bytes()).unwrap();
        assert_eq!(first, second, "round trip changed {}", first.summary());
    }
}

/// Parser warnings show up in the output of a failing test.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn strict_assembler_rejects_what_lenient_keeps() {
    init_tracing();
    let block = "OPTIONS sip:carol@chicago.com SIP/2.0\r\nContent-Type: text\r\nCall-ID: q\r\n";
    let lenient = MessageAssembler::new().assemble(block, Bytes::new()).unwrap();
    assert!(lenient.header(&HeaderName::ContentType).unwrap().is_raw());

    let err = MessageAssembler::strict().assemble(block, Bytes::new()).unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::Lexical);
    assert_eq!(err.remainder(), "");
}

#[test]
fn errors_carry_buffer_and_offset() {
    let err = parse_message(b"INVITE sip:bob@biloxi.com SIP/2.0\r\nCSeq: 1 INVITE extra\r\n\r\n").unwrap_err();
    let parse = err.as_parse_error().unwrap();
    assert_eq!(parse.kind, ParseErrorKind::Grammar);
    assert_eq!(parse.buffer, "CSeq: 1 INVITE extra");
    assert_eq!(parse.offset, 15);
}

#[test]
fn non_utf8_header_block_is_lexical_error() {
    let err = parse_message(b"OPTIONS sip:a@b SIP/2.0\r\nSubject: \xff\xfe\r\n\r\n").unwrap_err();
    assert_eq!(err.as_parse_error().map(|e| e.kind), Some(ParseErrorKind::Lexical));
}

#[test]
fn binary_body_survives() {
    let mut data = b"MESSAGE sip:a@b SIP/2.0\r\nContent-Length: 3\r\n\r\n".to_vec();
    data.extend_from_slice(&[0x00, 0xff, 0x10]);
    let msg = parse_message(&data).unwrap();
    assert_eq!(msg.body().as_ref(), &[0x00, 0xff, 0x10]);
}
