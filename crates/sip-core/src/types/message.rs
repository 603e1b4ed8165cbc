//! Requests, responses and shared header access.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::types::address::Address;
use crate::types::cseq::CSeq;
use crate::types::header::{ContactValue, Header, HeaderName, HeaderValue};
use crate::types::media_type::MediaType;
use crate::types::method::Method;
use crate::types::param::ParamList;
use crate::types::status::StatusCode;
use crate::types::uri::Uri;
use crate::types::version::Version;
use crate::types::via::ViaHeader;

/// Typed accessors over an ordered header list.
///
/// List-valued headers are flattened across every line carrying them, in
/// message order, so `vias()[0]` is always the topmost Via.
pub trait HeaderAccess {
    fn headers(&self) -> &[Header];
    fn headers_mut(&mut self) -> &mut Vec<Header>;

    fn header(&self, name: &HeaderName) -> Option<&Header> {
        self.headers().iter().find(|h| &h.name == name)
    }

    fn headers_named<'a>(&'a self, name: &HeaderName) -> Vec<&'a Header> {
        self.headers().iter().filter(|h| &h.name == name).collect()
    }

    fn push_header(&mut self, header: Header) {
        self.headers_mut().push(header);
    }

    /// Replace every line named like `header` with `header`, keeping the
    /// position of the first one. Appends when absent.
    fn set_header(&mut self, header: Header) {
        let headers = self.headers_mut();
        match headers.iter().position(|h| h.name == header.name) {
            Some(index) => {
                let name = header.name.clone();
                headers[index] = header;
                let mut seen = 0usize;
                headers.retain(|h| {
                    if h.name != name {
                        return true;
                    }
                    seen += 1;
                    seen == 1
                });
            }
            None => headers.push(header),
        }
    }

    fn remove_header(&mut self, name: &HeaderName) -> bool {
        let headers = self.headers_mut();
        let before = headers.len();
        headers.retain(|h| &h.name != name);
        headers.len() != before
    }

    fn vias(&self) -> Vec<&ViaHeader> {
        self.headers()
            .iter()
            .filter_map(|h| match &h.value {
                HeaderValue::Via(vias) => Some(vias.iter()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn top_via(&self) -> Option<&ViaHeader> {
        self.headers().iter().find_map(|h| match &h.value {
            HeaderValue::Via(vias) => vias.first(),
            _ => None,
        })
    }

    fn from_address(&self) -> Option<&Address> {
        address_of(self.headers(), &HeaderName::From)
    }

    fn to_address(&self) -> Option<&Address> {
        address_of(self.headers(), &HeaderName::To)
    }

    fn to_address_mut(&mut self) -> Option<&mut Address> {
        self.headers_mut().iter_mut().find_map(|h| match (&h.name, &mut h.value) {
            (HeaderName::To, HeaderValue::Address(addr)) => Some(addr),
            _ => None,
        })
    }

    fn from_tag(&self) -> Option<&str> {
        self.from_address().and_then(|a| a.tag())
    }

    fn to_tag(&self) -> Option<&str> {
        self.to_address().and_then(|a| a.tag())
    }

    fn call_id(&self) -> Option<&str> {
        self.headers().iter().find_map(|h| match &h.value {
            HeaderValue::CallId(id) => Some(id.as_str()),
            _ => None,
        })
    }

    fn cseq(&self) -> Option<&CSeq> {
        self.headers().iter().find_map(|h| match &h.value {
            HeaderValue::CSeq(cseq) => Some(cseq),
            _ => None,
        })
    }

    fn content_length(&self) -> Option<u32> {
        number_of(self.headers(), &HeaderName::ContentLength)
    }

    fn max_forwards(&self) -> Option<u32> {
        number_of(self.headers(), &HeaderName::MaxForwards)
    }

    fn content_type(&self) -> Option<&MediaType> {
        self.headers().iter().find_map(|h| match &h.value {
            HeaderValue::ContentType(media) => Some(media),
            _ => None,
        })
    }

    fn contacts(&self) -> Vec<&Address> {
        self.headers()
            .iter()
            .filter_map(|h| match &h.value {
                HeaderValue::Contact(ContactValue::Addresses(addrs)) => Some(addrs.iter()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn record_route(&self) -> Vec<&Address> {
        address_list_of(self.headers(), &HeaderName::RecordRoute)
    }

    fn routes(&self) -> Vec<&Address> {
        address_list_of(self.headers(), &HeaderName::Route)
    }
}

fn address_of<'a>(headers: &'a [Header], name: &HeaderName) -> Option<&'a Address> {
    headers.iter().find_map(|h| match &h.value {
        HeaderValue::Address(addr) if &h.name == name => Some(addr),
        _ => None,
    })
}

fn number_of(headers: &[Header], name: &HeaderName) -> Option<u32> {
    headers.iter().find_map(|h| match &h.value {
        HeaderValue::Number(n) if &h.name == name => Some(*n),
        _ => None,
    })
}

fn address_list_of<'a>(headers: &'a [Header], name: &HeaderName) -> Vec<&'a Address> {
    headers
        .iter()
        .filter(|h| &h.name == name)
        .filter_map(|h| match &h.value {
            HeaderValue::AddressList(addrs) => Some(addrs.iter()),
            _ => None,
        })
        .flatten()
        .collect()
}

fn write_headers(f: &mut fmt::Formatter<'_>, headers: &[Header]) -> fmt::Result {
    for header in headers {
        write!(f, "{}\r\n", header)?;
    }
    f.write_str("\r\n")
}

fn encode(head: String, body: &Bytes) -> Bytes {
    let mut buf = BytesMut::with_capacity(head.len() + body.len());
    buf.put_slice(head.as_bytes());
    buf.put_slice(body);
    buf.freeze()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: Vec<Header>,
    pub body: Bytes,
}

impl Request {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            version: Version::sip_2_0(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn with_header(mut self, header: Header) -> Self {
        self.headers.push(header);
        self
    }

    /// Set the body and keep Content-Length in step with it.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.set_body(body);
        self
    }

    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
        let len = self.body.len() as u32;
        self.set_header(Header::new(HeaderName::ContentLength, HeaderValue::Number(len)));
    }

    fn head(&self) -> String {
        let mut head = format!("{} {} {}\r\n", self.method, self.uri, self.version);
        for header in &self.headers {
            head.push_str(&header.to_string());
            head.push_str("\r\n");
        }
        head.push_str("\r\n");
        head
    }

    /// Exact wire bytes, including a binary body.
    pub fn to_bytes(&self) -> Bytes {
        encode(self.head(), &self.body)
    }
}

impl HeaderAccess for Request {
    fn headers(&self) -> &[Header] {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut Vec<Header> {
        &mut self.headers
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}\r\n", self.method, self.uri, self.version)?;
        write_headers(f, &self.headers)?;
        f.write_str(&String::from_utf8_lossy(&self.body))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub version: Version,
    pub status: StatusCode,
    pub reason: String,
    pub headers: Vec<Header>,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            version: Version::sip_2_0(),
            status,
            reason: status.reason_phrase().to_string(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_header(mut self, header: Header) -> Self {
        self.headers.push(header);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.set_body(body);
        self
    }

    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
        let len = self.body.len() as u32;
        self.set_header(Header::new(HeaderName::ContentLength, HeaderValue::Number(len)));
    }

    fn head(&self) -> String {
        let mut head = format!("{} {} {}\r\n", self.version, self.status, self.reason);
        for header in &self.headers {
            head.push_str(&header.to_string());
            head.push_str("\r\n");
        }
        head.push_str("\r\n");
        head
    }

    pub fn to_bytes(&self) -> Bytes {
        encode(self.head(), &self.body)
    }
}

impl HeaderAccess for Response {
    fn headers(&self) -> &[Header] {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut Vec<Header> {
        &mut self.headers
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}\r\n", self.version, self.status, self.reason)?;
        write_headers(f, &self.headers)?;
        f.write_str(&String::from_utf8_lossy(&self.body))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    Request(Request),
    Response(Response),
}

impl Message {
    pub fn is_request(&self) -> bool {
        matches!(self, Message::Request(_))
    }

    pub fn as_request(&self) -> Option<&Request> {
        match self {
            Message::Request(req) => Some(req),
            Message::Response(_) => None,
        }
    }

    pub fn as_response(&self) -> Option<&Response> {
        match self {
            Message::Response(resp) => Some(resp),
            Message::Request(_) => None,
        }
    }

    pub fn body(&self) -> &Bytes {
        match self {
            Message::Request(req) => &req.body,
            Message::Response(resp) => &resp.body,
        }
    }

    /// Branch of the topmost Via, the transaction identifier.
    pub fn branch(&self) -> Option<&str> {
        self.top_via().and_then(|via| via.branch())
    }

    pub fn to_bytes(&self) -> Bytes {
        match self {
            Message::Request(req) => req.to_bytes(),
            Message::Response(resp) => resp.to_bytes(),
        }
    }

    /// Short start-line summary for log lines.
    pub fn summary(&self) -> String {
        match self {
            Message::Request(req) => format!("{} {}", req.method, req.uri),
            Message::Response(resp) => format!("{} {}", resp.status, resp.reason),
        }
    }
}

impl HeaderAccess for Message {
    fn headers(&self) -> &[Header] {
        match self {
            Message::Request(req) => &req.headers,
            Message::Response(resp) => &resp.headers,
        }
    }

    fn headers_mut(&mut self) -> &mut Vec<Header> {
        match self {
            Message::Request(req) => &mut req.headers,
            Message::Response(resp) => &mut resp.headers,
        }
    }
}

impl From<Request> for Message {
    fn from(req: Request) -> Self {
        Message::Request(req)
    }
}

impl From<Response> for Message {
    fn from(resp: Response) -> Self {
        Message::Response(resp)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Request(req) => write!(f, "{}", req),
            Message::Response(resp) => write!(f, "{}", resp),
        }
    }
}
