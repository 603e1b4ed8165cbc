//! Message Assembler: start line plus header block plus body into a
//! [`Message`].
//!
//! Header lines are dispatched through a [`HeaderParserRegistry`]. What
//! happens to a header whose grammar fails is decided by a
//! [`HeaderErrorPolicy`]: the message can be rejected outright or the
//! header kept as opaque raw text.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use super::chars::{digits, token};
use super::lexer::{Lexer, LexerMode};
use super::registry::{standard_registry, HeaderParserRegistry};
use super::uri::parse_uri;
use super::utils::{find_header_end, unfold_lines};
use crate::error::{ParseError, Result};
use crate::types::header::{Header, HeaderName};
use crate::types::message::{HeaderAccess, Message, Request, Response};
use crate::types::method::Method;
use crate::types::status::StatusCode;
use crate::types::version::Version;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderErrorAction {
    /// Fail the whole message with the header's parse error
    Reject,
    /// Keep the header as raw text and carry on
    RetainRaw,
}

/// Decides the fate of a header whose grammar failed.
pub trait HeaderErrorPolicy: fmt::Debug + Send + Sync {
    fn on_header_error(&self, name: &HeaderName, raw_value: &str, error: &ParseError) -> HeaderErrorAction;
}

/// Any bad header rejects the message.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictPolicy;

impl HeaderErrorPolicy for StrictPolicy {
    fn on_header_error(&self, _name: &HeaderName, _raw: &str, _error: &ParseError) -> HeaderErrorAction {
        HeaderErrorAction::Reject
    }
}

/// Keeps bad headers as raw text, except the ones transactions and
/// dialogs cannot work without.
#[derive(Debug, Clone, Copy, Default)]
pub struct LenientPolicy;

impl LenientPolicy {
    fn is_essential(name: &HeaderName) -> bool {
        matches!(
            name,
            HeaderName::Via
                | HeaderName::From
                | HeaderName::To
                | HeaderName::CallId
                | HeaderName::CSeq
                | HeaderName::ContentLength
        )
    }
}

impl HeaderErrorPolicy for LenientPolicy {
    fn on_header_error(&self, name: &HeaderName, _raw: &str, _error: &ParseError) -> HeaderErrorAction {
        if Self::is_essential(name) {
            HeaderErrorAction::Reject
        } else {
            HeaderErrorAction::RetainRaw
        }
    }
}

#[derive(Debug, Clone)]
pub struct MessageAssembler {
    registry: Arc<HeaderParserRegistry>,
    policy: Arc<dyn HeaderErrorPolicy>,
}

impl Default for MessageAssembler {
    fn default() -> Self {
        Self::new()
    }
}

enum StartLine {
    Request(Method, crate::types::uri::Uri, Version),
    Response(Version, StatusCode, String),
}

impl MessageAssembler {
    /// Standard registry, lenient header policy.
    pub fn new() -> Self {
        Self {
            registry: standard_registry(),
            policy: Arc::new(LenientPolicy),
        }
    }

    pub fn strict() -> Self {
        Self::new().with_policy(Arc::new(StrictPolicy))
    }

    pub fn with_policy(mut self, policy: Arc<dyn HeaderErrorPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_registry(mut self, registry: Arc<HeaderParserRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &HeaderParserRegistry {
        &self.registry
    }

    /// Build a message from a header block (start line included, blank
    /// terminator optional) and an already-delimited body.
    pub fn assemble(&self, header_block: &str, body: Bytes) -> std::result::Result<Message, ParseError> {
        let lines = unfold_lines(header_block);
        let (start_line, header_lines) = lines
            .split_first()
            .ok_or_else(|| ParseError::grammar(header_block, 0, "empty header block"))?;

        let mut headers = Vec::with_capacity(header_lines.len());
        for line in header_lines {
            headers.push(self.parse_header(line)?);
        }
        check_singletons(&headers, header_block)?;

        let message = match parse_start_line(start_line)? {
            StartLine::Request(method, uri, version) => Message::Request(Request {
                method,
                uri,
                version,
                headers,
                body,
            }),
            StartLine::Response(version, status, reason) => Message::Response(Response {
                version,
                status,
                reason,
                headers,
                body,
            }),
        };
        debug!(summary = %message.summary(), "assembled message");
        Ok(message)
    }

    /// Parse one complete datagram. Content-Length, when present, bounds the
    /// body; extra trailing bytes are dropped and a shortfall is an error.
    pub fn parse_datagram(&self, data: &[u8]) -> std::result::Result<Message, ParseError> {
        let data = trim_leading_blank_lines(data);
        let (head_len, body_start) = find_header_end(data).unwrap_or((data.len(), data.len()));
        let head = std::str::from_utf8(&data[..head_len]).map_err(|e| {
            ParseError::lexical(
                &String::from_utf8_lossy(&data[..head_len]),
                e.valid_up_to(),
                "header block is not valid UTF-8",
            )
        })?;

        let mut body = Bytes::copy_from_slice(&data[body_start..]);
        let mut message = self.assemble(head, Bytes::new())?;
        if let Some(declared) = message.content_length() {
            let declared = declared as usize;
            if declared > body.len() {
                return Err(ParseError::grammar(
                    head,
                    head_len,
                    format!("Content-Length {} exceeds the {} body bytes received", declared, body.len()),
                ));
            }
            body.truncate(declared);
        }
        match &mut message {
            Message::Request(req) => req.body = body,
            Message::Response(resp) => resp.body = body,
        }
        Ok(message)
    }

    fn parse_header(&self, line: &str) -> std::result::Result<Header, ParseError> {
        match self.registry.parse_header_line(line) {
            Ok(header) => Ok(header),
            Err(error) => {
                let (name, value) = line.split_once(':').ok_or_else(|| error.clone())?;
                let name = name.trim();
                let canonical = self
                    .registry
                    .lookup(name)
                    .map(|(canonical, _)| canonical.clone())
                    .unwrap_or_else(|| HeaderName::Other(name.to_string()));
                let value = value.trim();
                match self.policy.on_header_error(&canonical, value, &error) {
                    HeaderErrorAction::Reject => Err(error),
                    HeaderErrorAction::RetainRaw => {
                        warn!(header = %canonical, error = %error, "keeping unparsable header as raw text");
                        Ok(Header::raw(canonical, value))
                    }
                }
            }
        }
    }
}

fn trim_leading_blank_lines(mut data: &[u8]) -> &[u8] {
    while let Some(rest) = data.strip_prefix(b"\r\n").or_else(|| data.strip_prefix(b"\n")) {
        data = rest;
    }
    data
}

fn check_singletons(headers: &[Header], block: &str) -> std::result::Result<(), ParseError> {
    for name in [HeaderName::CallId, HeaderName::CSeq, HeaderName::ContentLength] {
        if headers.iter().filter(|h| h.name == name).count() > 1 {
            return Err(ParseError::grammar(block, 0, format!("duplicate {} header", name)));
        }
    }
    Ok(())
}

fn parse_version(lx: &mut Lexer<'_>) -> std::result::Result<Version, ParseError> {
    let start = lx.offset();
    lx.match_literal("SIP/")?;
    let major = lx.scan_text(digits, "major version")?;
    lx.match_char(b'.')?;
    let minor = lx.scan_text(digits, "minor version")?;
    match (major.parse(), minor.parse()) {
        (Ok(major), Ok(minor)) => Ok(Version::new(major, minor)),
        _ => Err(ParseError::grammar(lx.input(), start, "version number out of range")),
    }
}

fn parse_start_line(line: &str) -> std::result::Result<StartLine, ParseError> {
    let mut lx = Lexer::new(line);
    let is_response = line.get(..4).is_some_and(|p| p.eq_ignore_ascii_case("SIP/"));

    if is_response {
        let version = parse_version(&mut lx)?;
        lx.match_char(b' ')?;
        let code_start = lx.offset();
        let code = lx.scan_text(digits, "status code")?;
        let status = code
            .parse::<u16>()
            .ok()
            .filter(|_| code.len() == 3)
            .and_then(|c| StatusCode::from_u16(c).ok())
            .ok_or_else(|| ParseError::grammar(line, code_start, format!("invalid status code '{}'", code)))?;
        let reason = if lx.accept_char(b' ') {
            lx.consume_rest().trim_end().to_string()
        } else {
            lx.expect_end()?;
            String::new()
        };
        Ok(StartLine::Response(version, status, reason))
    } else {
        let method_start = lx.offset();
        let method = lx.scan_text(token, "method")?;
        let method = method
            .parse::<Method>()
            .map_err(|e| ParseError::grammar(line, method_start, e.to_string()))?;
        lx.match_char(b' ')?;
        let uri = lx.with_mode(LexerMode::Uri, |lx| parse_uri(lx, true))?;
        lx.match_char(b' ')?;
        let version = parse_version(&mut lx)?;
        lx.expect_end()?;
        Ok(StartLine::Request(method, uri, version))
    }
}

/// Parse a complete message held in memory with the default assembler.
pub fn parse_message(data: &[u8]) -> Result<Message> {
    Ok(MessageAssembler::new().parse_datagram(data)?)
}
