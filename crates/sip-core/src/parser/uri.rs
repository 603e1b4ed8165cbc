//! SIP / SIPS URI grammar (RFC 3261 section 19.1).

use nom::bytes::complete::take_while1;

use super::chars::{digits, is_uri_header_char, is_uri_param_char, is_user_char, ParseResult};
use super::lexer::{Lexer, LexerMode, TokenKind};
use crate::error::ParseError;
use crate::types::param::{GenericValue, Param};
use crate::types::uri::{Host, Scheme, Uri};

fn user_text(input: &[u8]) -> ParseResult<'_, &[u8]> {
    take_while1(is_user_char)(input)
}

fn param_text(input: &[u8]) -> ParseResult<'_, &[u8]> {
    take_while1(is_uri_param_char)(input)
}

fn header_text(input: &[u8]) -> ParseResult<'_, &[u8]> {
    take_while1(is_uri_header_char)(input)
}

/// Parse a URI at the cursor.
///
/// With `allow_params` false the URI stops after host and port: an
/// addr-spec written without angle brackets hands any `;params` to the
/// enclosing header instead.
pub fn parse_uri(lx: &mut Lexer<'_>, allow_params: bool) -> Result<Uri, ParseError> {
    let scheme_start = lx.offset();
    let scheme = lx.with_mode(LexerMode::Core, |lx| lx.match_kind(TokenKind::Identifier))?;
    let scheme = scheme.text.parse::<Scheme>().map_err(|_| {
        ParseError::grammar(
            lx.input(),
            scheme_start,
            format!("unsupported URI scheme '{}'", scheme.text),
        )
    })?;
    lx.match_char(b':')?;

    let mut uri = Uri::new(scheme, Host::domain(""));
    if let Ok((user, password)) = lx.attempt(parse_userinfo) {
        uri.user = Some(user);
        uri.password = password;
    }

    uri.host = parse_host(lx)?;
    uri.port = parse_port(lx)?;

    if allow_params {
        uri.params = parse_uri_params(lx)?;
        uri.headers = parse_uri_headers(lx)?;
    }
    Ok(uri)
}

/// `user [ ":" password ] "@"`; the caller backtracks when there is none.
fn parse_userinfo(lx: &mut Lexer<'_>) -> Result<(String, Option<String>), ParseError> {
    lx.with_mode(LexerMode::Uri, |lx| {
        let user = lx.scan_text(user_text, "user")?.to_string();
        let password = if lx.accept_char(b':') {
            if lx.peek_is(b'@') {
                Some(String::new())
            } else {
                Some(lx.scan_text(user_text, "password")?.to_string())
            }
        } else {
            None
        };
        lx.match_char(b'@')?;
        Ok((user, password))
    })
}

pub(crate) fn parse_host(lx: &mut Lexer<'_>) -> Result<Host, ParseError> {
    let token = lx.with_mode(LexerMode::Host, |lx| lx.next_token())?;
    match token.kind {
        TokenKind::Identifier | TokenKind::Digits | TokenKind::Keyword => Ok(Host::parse(token.text)),
        TokenKind::Punct(c) => Err(ParseError::lexical(
            lx.input(),
            token.offset,
            format!("expected host, found '{}'", c.escape_ascii()),
        )),
    }
}

pub(crate) fn parse_port(lx: &mut Lexer<'_>) -> Result<Option<u16>, ParseError> {
    if !lx.accept_char(b':') {
        return Ok(None);
    }
    let start = lx.offset();
    let text = lx.scan_text(digits, "port")?;
    text.parse::<u16>()
        .map(Some)
        .map_err(|_| ParseError::grammar(lx.input(), start, format!("port '{}' out of range", text)))
}

fn parse_uri_params(lx: &mut Lexer<'_>) -> Result<Vec<Param>, ParseError> {
    let mut params = Vec::new();
    while lx.accept_char(b';') {
        let name = lx.scan_text(param_text, "URI parameter name")?;
        let value = if lx.accept_char(b'=') {
            Some(GenericValue::Token(lx.scan_text(param_text, "URI parameter value")?.to_string()))
        } else {
            None
        };
        params.push(Param::from_parts(name, value));
    }
    Ok(params)
}

fn parse_uri_headers(lx: &mut Lexer<'_>) -> Result<Vec<(String, String)>, ParseError> {
    let mut headers = Vec::new();
    if !lx.accept_char(b'?') {
        return Ok(headers);
    }
    loop {
        let name = lx.scan_text(header_text, "URI header name")?.to_string();
        lx.match_char(b'=')?;
        let value = if lx.peek_is(b'&') || lx.is_at_end() {
            String::new()
        } else {
            lx.scan_text(header_text, "URI header value")?.to_string()
        };
        headers.push((name, value));
        if !lx.accept_char(b'&') {
            return Ok(headers);
        }
    }
}
