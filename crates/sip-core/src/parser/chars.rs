//! Character classes and small terminal grammars (RFC 3261 section 25.1)
//! shared by the lexer and the header grammars.

use nom::{
    branch::alt,
    bytes::complete::{tag, take, take_while, take_while1},
    combinator::{map_res, opt, recognize},
    multi::many0,
    sequence::{delimited, pair},
    IResult,
};

pub type ParseResult<'a, O> = IResult<&'a [u8], O>;

/// token = 1*(alphanum / "-" / "." / "!" / "%" / "*" / "_" / "+" / "`" / "'" / "~")
pub fn is_token_char(c: u8) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(c, b'-' | b'.' | b'!' | b'%' | b'*' | b'_' | b'+' | b'`' | b'\'' | b'~')
}

/// word: token characters plus the separators allowed in Call-ID
pub fn is_word_char(c: u8) -> bool {
    is_token_char(c)
        || matches!(
            c,
            b'(' | b')' | b'<' | b'>' | b':' | b'\\' | b'"' | b'/' | b'[' | b']' | b'?' | b'{' | b'}'
        )
}

/// unreserved = alphanum / mark
pub fn is_unreserved(c: u8) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(c, b'-' | b'_' | b'.' | b'!' | b'~' | b'*' | b'\'' | b'(' | b')')
}

/// Characters of the userinfo part of a SIP URI (escapes handled as `%`).
pub fn is_user_char(c: u8) -> bool {
    is_unreserved(c) || matches!(c, b'%' | b'&' | b'=' | b'+' | b'$' | b',')
}

/// paramchar for URI parameters, `[`/`]`/`:` included for IPv6 maddr values
pub fn is_uri_param_char(c: u8) -> bool {
    is_unreserved(c) || matches!(c, b'%' | b'[' | b']' | b'/' | b':' | b'&' | b'+' | b'$')
}

/// hnv-unreserved / unreserved for `?name=value` URI headers
pub fn is_uri_header_char(c: u8) -> bool {
    is_unreserved(c) || matches!(c, b'%' | b'[' | b']' | b'/' | b':' | b'+' | b'$')
}

/// Host names and IPv4 literals
pub fn is_host_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, b'-' | b'.')
}

/// Unquoted generic-param value: token, or a host / IPv6 literal.
pub fn is_param_value_char(c: u8) -> bool {
    is_token_char(c) || matches!(c, b':' | b'[' | b']')
}

pub fn is_wsp(c: u8) -> bool {
    c == b' ' || c == b'\t'
}

/// SWS: optional whitespace that may continue over one folded line
/// (`*WSP CRLF 1*WSP`). A line break with no WSP after it ends the header
/// and stays in the input.
pub fn sws(input: &[u8]) -> ParseResult<'_, &[u8]> {
    recognize(pair(
        take_while(is_wsp),
        opt(pair(alt((tag(b"\r\n"), tag(b"\n"))), take_while1(is_wsp))),
    ))(input)
}

pub fn token(input: &[u8]) -> ParseResult<'_, &[u8]> {
    take_while1(is_token_char)(input)
}

pub fn word(input: &[u8]) -> ParseResult<'_, &[u8]> {
    take_while1(is_word_char)(input)
}

pub fn digits(input: &[u8]) -> ParseResult<'_, &[u8]> {
    take_while1(|c: u8| c.is_ascii_digit())(input)
}

// quoted-pair = "\" (%x00-09 / %x0B-0C / %x0E-7F)
fn quoted_pair(input: &[u8]) -> ParseResult<'_, &[u8]> {
    recognize(pair(
        tag(b"\\"),
        map_res(take(1usize), |c: &[u8]| {
            if c[0] == b'\r' || c[0] == b'\n' || c[0] > 0x7f {
                Err("invalid escape")
            } else {
                Ok(c)
            }
        }),
    ))(input)
}

// qdtext = LWS / %x21 / %x23-5B / %x5D-7E / UTF8-NONASCII
fn qdtext(input: &[u8]) -> ParseResult<'_, &[u8]> {
    take_while1(|c: u8| c == b' ' || c == b'\t' || c == 0x21 || (0x23..=0x5b).contains(&c) || (0x5d..=0x7e).contains(&c) || c >= 0x80)(input)
}

/// quoted-string, returning the raw content between the quotes
pub fn quoted_string(input: &[u8]) -> ParseResult<'_, &[u8]> {
    delimited(tag(b"\""), recognize(many0(alt((qdtext, quoted_pair)))), tag(b"\""))(input)
}

/// Drop the backslash of every quoted-pair.
pub fn unescape_quoted(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Inverse of [`unescape_quoted`]: escape `"` and `\`.
pub fn escape_quoted(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
