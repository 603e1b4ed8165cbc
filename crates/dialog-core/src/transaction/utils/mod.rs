//! Helpers shared by the transaction and dialog layers: identifiers,
//! response construction and the ACK for non-2xx final responses.

pub mod request_builders;

use std::net::SocketAddr;

use bytes::Bytes;
use rand::distributions::Alphanumeric;
use rand::Rng;
use sipwire_sip_core::types::{Host, Scheme};
use sipwire_sip_core::{
    CSeq, Header, HeaderAccess, HeaderName, HeaderValue, Method, Request, Response, StatusCode, Uri,
    ViaHeader,
};
use uuid::Uuid;

use crate::transaction::error::{Error, Result};

pub use request_builders::{create_request, via_for_transport};

/// Fresh RFC 3261 branch: the `z9hG4bK` magic cookie plus a UUID.
pub fn generate_branch() -> String {
    format!("{}{}", sipwire_sip_core::types::BRANCH_MAGIC_COOKIE, Uuid::new_v4().simple())
}

/// Random from/to tag.
pub fn generate_tag() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect()
}

pub fn generate_call_id(host: &str) -> String {
    format!("{}@{}", Uuid::new_v4().simple(), host)
}

/// Response to `request` carrying its Via, From, To, Call-ID and CSeq
/// headers, in request order, and an empty body.
pub fn create_response(request: &Request, status: StatusCode) -> Response {
    let mut response = Response::new(status);
    for header in request.headers() {
        if matches!(
            header.name,
            HeaderName::Via | HeaderName::From | HeaderName::To | HeaderName::CallId | HeaderName::CSeq
        ) {
            response.push_header(header.clone());
        }
    }
    response.with_body(Bytes::new())
}

/// ACK for a 3xx-6xx final response to `invite` (RFC 3261 section
/// 17.1.1.3). It reuses the INVITE's branch, so it belongs to the same
/// transaction on the server side.
pub fn create_ack_for_non_2xx(invite: &Request, response: &Response) -> Result<Request> {
    let via = invite
        .top_via()
        .cloned()
        .ok_or_else(|| Error::InvalidRequest("INVITE has no Via".to_string()))?;
    let to = response
        .to_address()
        .cloned()
        .ok_or_else(|| Error::InvalidRequest("response has no To".to_string()))?;
    let cseq = invite
        .cseq()
        .ok_or_else(|| Error::InvalidRequest("INVITE has no CSeq".to_string()))?;

    let mut ack = Request::new(Method::Ack, invite.uri.clone())
        .with_header(Header::new(HeaderName::Via, HeaderValue::Via(vec![via])));
    if let Some(from) = invite.header(&HeaderName::From) {
        ack.push_header(from.clone());
    }
    ack.push_header(Header::new(HeaderName::To, HeaderValue::Address(to)));
    if let Some(call_id) = invite.header(&HeaderName::CallId) {
        ack.push_header(call_id.clone());
    }
    ack.push_header(Header::new(HeaderName::CSeq, HeaderValue::CSeq(CSeq::new(cseq.seq, Method::Ack))));
    for route in invite.headers_named(&HeaderName::Route) {
        ack.push_header(route.clone());
    }
    ack.push_header(Header::new(HeaderName::MaxForwards, HeaderValue::Number(70)));
    Ok(ack.with_body(Bytes::new()))
}

/// Whether `ack` acknowledges the 2xx answering `invite`: the 2xx ACK has
/// its own branch, so it is matched on Call-ID, From tag and CSeq number.
pub fn is_ack_for(invite: &Request, ack: &Request) -> bool {
    ack.method == Method::Ack
        && invite.call_id().is_some()
        && invite.call_id() == ack.call_id()
        && invite.from_tag() == ack.from_tag()
        && invite.cseq().map(|c| c.seq) == ack.cseq().map(|c| c.seq)
}

/// Socket address for a URI whose host is an IP literal. Name resolution
/// is left to the application.
pub fn uri_socket_addr(uri: &Uri) -> Option<SocketAddr> {
    match &uri.host {
        Host::Address(ip) => {
            let default_port = match uri.scheme {
                Scheme::Sips => 5061,
                _ => 5060,
            };
            Some(SocketAddr::new(*ip, uri.port.unwrap_or(default_port)))
        }
        Host::Domain(_) => None,
    }
}

/// Top Via sent-by as a socket address, when it is an IP literal.
pub fn via_socket_addr(via: &ViaHeader) -> Option<SocketAddr> {
    match &via.host {
        Host::Address(ip) => Some(SocketAddr::new(*ip, via.port.unwrap_or(5060))),
        Host::Domain(_) => None,
    }
}
