//! Header model.
//!
//! A [`Header`] is one header line: a [`HeaderName`] plus a [`HeaderValue`].
//! Headers with a dedicated grammar carry a typed value; anything else is
//! kept verbatim as [`HeaderValue::Raw`]. Headers whose grammar allows a
//! comma-separated list (Via, Route, Contact, ...) hold every value of that
//! line in order.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::parser::chars::is_token_char;
use crate::types::address::Address;
use crate::types::cseq::CSeq;
use crate::types::event::EventType;
use crate::types::media_type::MediaType;
use crate::types::method::Method;
use crate::types::via::ViaHeader;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HeaderName {
    Via,
    From,
    To,
    CallId,
    CSeq,
    Contact,
    ContentLength,
    ContentType,
    ContentEncoding,
    MaxForwards,
    Expires,
    Route,
    RecordRoute,
    ReferTo,
    Supported,
    Require,
    Allow,
    AllowEvents,
    Event,
    Subject,
    Other(String),
}

impl HeaderName {
    pub fn as_str(&self) -> &str {
        match self {
            HeaderName::Via => "Via",
            HeaderName::From => "From",
            HeaderName::To => "To",
            HeaderName::CallId => "Call-ID",
            HeaderName::CSeq => "CSeq",
            HeaderName::Contact => "Contact",
            HeaderName::ContentLength => "Content-Length",
            HeaderName::ContentType => "Content-Type",
            HeaderName::ContentEncoding => "Content-Encoding",
            HeaderName::MaxForwards => "Max-Forwards",
            HeaderName::Expires => "Expires",
            HeaderName::Route => "Route",
            HeaderName::RecordRoute => "Record-Route",
            HeaderName::ReferTo => "Refer-To",
            HeaderName::Supported => "Supported",
            HeaderName::Require => "Require",
            HeaderName::Allow => "Allow",
            HeaderName::AllowEvents => "Allow-Events",
            HeaderName::Event => "Event",
            HeaderName::Subject => "Subject",
            HeaderName::Other(name) => name,
        }
    }

    /// Single-letter form (RFC 3261 section 7.3.3, RFC 6665, RFC 3515).
    pub fn compact_form(&self) -> Option<&'static str> {
        match self {
            HeaderName::Via => Some("v"),
            HeaderName::From => Some("f"),
            HeaderName::To => Some("t"),
            HeaderName::Contact => Some("m"),
            HeaderName::CallId => Some("i"),
            HeaderName::ContentLength => Some("l"),
            HeaderName::ContentType => Some("c"),
            HeaderName::Supported => Some("k"),
            HeaderName::Subject => Some("s"),
            HeaderName::ContentEncoding => Some("e"),
            HeaderName::Event => Some("o"),
            HeaderName::ReferTo => Some("r"),
            HeaderName::AllowEvents => Some("u"),
            _ => None,
        }
    }

    /// Every standard name; the header parser registry is built from this.
    pub fn standard() -> &'static [HeaderName] {
        &[
            HeaderName::Via,
            HeaderName::From,
            HeaderName::To,
            HeaderName::CallId,
            HeaderName::CSeq,
            HeaderName::Contact,
            HeaderName::ContentLength,
            HeaderName::ContentType,
            HeaderName::ContentEncoding,
            HeaderName::MaxForwards,
            HeaderName::Expires,
            HeaderName::Route,
            HeaderName::RecordRoute,
            HeaderName::ReferTo,
            HeaderName::Supported,
            HeaderName::Require,
            HeaderName::Allow,
            HeaderName::AllowEvents,
            HeaderName::Event,
            HeaderName::Subject,
        ]
    }

    /// Headers that may appear at most once per message.
    pub fn is_singleton(&self) -> bool {
        matches!(
            self,
            HeaderName::CallId | HeaderName::CSeq | HeaderName::ContentLength
        )
    }
}

impl fmt::Display for HeaderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HeaderName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() || !s.bytes().all(is_token_char) {
            return Err(Error::InvalidHeader {
                name: s.to_string(),
                reason: "header name must be a non-empty token".to_string(),
            });
        }
        let known = HeaderName::standard().iter().find(|name| {
            name.as_str().eq_ignore_ascii_case(s)
                || name.compact_form().is_some_and(|c| c.eq_ignore_ascii_case(s))
        });
        Ok(known.cloned().unwrap_or_else(|| HeaderName::Other(s.to_string())))
    }
}

/// Contact is either `*` (REGISTER removal) or a list of addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactValue {
    Wildcard,
    Addresses(Vec<Address>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeaderValue {
    Via(Vec<ViaHeader>),
    /// From, To, Refer-To
    Address(Address),
    /// Route, Record-Route
    AddressList(Vec<Address>),
    Contact(ContactValue),
    CSeq(CSeq),
    /// Content-Length, Max-Forwards, Expires
    Number(u32),
    CallId(String),
    ContentType(MediaType),
    /// Supported, Require, Allow-Events, Content-Encoding
    Tokens(Vec<String>),
    Methods(Vec<Method>),
    Event(EventType),
    /// Subject
    Text(String),
    /// Unregistered header, or a registered one kept unparsed
    Raw(String),
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Via(vias) => write_list(f, vias),
            HeaderValue::Address(addr) => write!(f, "{}", addr),
            HeaderValue::AddressList(addrs) => write_list(f, addrs),
            HeaderValue::Contact(ContactValue::Wildcard) => f.write_str("*"),
            HeaderValue::Contact(ContactValue::Addresses(addrs)) => write_list(f, addrs),
            HeaderValue::CSeq(cseq) => write!(f, "{}", cseq),
            HeaderValue::Number(n) => write!(f, "{}", n),
            HeaderValue::CallId(id) => f.write_str(id),
            HeaderValue::ContentType(media) => write!(f, "{}", media),
            HeaderValue::Tokens(tokens) => write_list(f, tokens),
            HeaderValue::Methods(methods) => write_list(f, methods),
            HeaderValue::Event(event) => write!(f, "{}", event),
            HeaderValue::Text(text) | HeaderValue::Raw(text) => f.write_str(text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: HeaderName,
    pub value: HeaderValue,
}

impl Header {
    pub fn new(name: HeaderName, value: HeaderValue) -> Self {
        Self { name, value }
    }

    /// Unparsed header; used for unknown names and lenient recovery.
    pub fn raw(name: HeaderName, text: impl Into<String>) -> Self {
        Self {
            name,
            value: HeaderValue::Raw(text.into()),
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self.value, HeaderValue::Raw(_))
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}
