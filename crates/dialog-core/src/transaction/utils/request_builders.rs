use std::net::SocketAddr;

use bytes::Bytes;
use sipwire_sip_core::types::Host;
use sipwire_sip_core::{Address, CSeq, Header, HeaderName, HeaderValue, Method, Request, Uri, ViaHeader};

/// Via for a request leaving through a transport bound to `local_addr`.
pub fn via_for_transport(local_addr: SocketAddr, reliable: bool, branch: impl Into<String>) -> ViaHeader {
    let transport = if reliable { "TCP" } else { "UDP" };
    ViaHeader::new(transport, Host::from(local_addr.ip()), Some(local_addr.port()), branch)
}

/// Out-of-dialog request with the mandatory RFC 3261 headers, in the order
/// of the RFC examples, and an empty body.
pub fn create_request(
    method: Method,
    uri: Uri,
    from: Address,
    to: Address,
    call_id: &str,
    seq: u32,
    via: ViaHeader,
) -> Request {
    let cseq = CSeq::new(seq, method.clone());
    Request::new(method, uri)
        .with_header(Header::new(HeaderName::Via, HeaderValue::Via(vec![via])))
        .with_header(Header::new(HeaderName::MaxForwards, HeaderValue::Number(70)))
        .with_header(Header::new(HeaderName::To, HeaderValue::Address(to)))
        .with_header(Header::new(HeaderName::From, HeaderValue::Address(from)))
        .with_header(Header::new(HeaderName::CallId, HeaderValue::CallId(call_id.to_string())))
        .with_header(Header::new(HeaderName::CSeq, HeaderValue::CSeq(cseq)))
        .with_body(Bytes::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sipwire_sip_core::{parse_message, HeaderAccess, Message};

    #[test]
    fn built_request_parses_back() {
        let from = Address::new("sip:alice@atlanta.com".parse().unwrap()).with_tag("9fxced76sl");
        let to = Address::new("sip:bob@biloxi.com".parse().unwrap());
        let via = via_for_transport("192.0.2.1:5060".parse().unwrap(), false, "z9hG4bK74bf9");
        let request = create_request(
            Method::Options,
            "sip:bob@192.0.2.4".parse().unwrap(),
            from,
            to,
            "3848276298220188511@atlanta.com",
            1,
            via,
        );

        let parsed = match parse_message(&request.to_bytes()).unwrap() {
            Message::Request(req) => req,
            other => panic!("expected request, got {:?}", other),
        };
        assert_eq!(parsed, request);
        assert_eq!(parsed.top_via().map(|v| v.transport.as_str()), Some("UDP"));
        assert_eq!(parsed.from_tag(), Some("9fxced76sl"));
        assert_eq!(parsed.cseq(), Some(&CSeq::new(1, Method::Options)));
    }
}
