//! `name-addr / addr-spec` followed by header parameters, shared by From,
//! To, Contact, Route, Record-Route and Refer-To.

use super::chars::{quoted_string, token, unescape_quoted};
use super::lexer::{Lexer, LexerMode};
use super::params::parse_params;
use super::uri::parse_uri;
use crate::error::ParseError;
use crate::types::address::Address;
use crate::types::uri::Uri;

pub fn parse_address(lx: &mut Lexer<'_>) -> Result<Address, ParseError> {
    lx.skip_ws();

    let mut address = if lx.peek_is(b'"') {
        let raw = lx.scan_text(quoted_string, "display name")?;
        let name = unescape_quoted(raw);
        lx.skip_ws();
        Address::new(parse_bracketed_uri(lx)?).with_display_name(name)
    } else if lx.peek_is(b'<') {
        Address::new(parse_bracketed_uri(lx)?)
    } else if let Ok(name) = lx.attempt(parse_token_display_name) {
        let address = Address::new(parse_bracketed_uri(lx)?);
        if name.is_empty() {
            address
        } else {
            address.with_display_name(name)
        }
    } else {
        Address::new(lx.with_mode(LexerMode::Uri, |lx| parse_uri(lx, false))?)
    };

    address.params = parse_params(lx)?;
    Ok(address)
}

/// Unquoted display name: `*(token LWS)` up to a `<`.
fn parse_token_display_name(lx: &mut Lexer<'_>) -> Result<String, ParseError> {
    let mut words = Vec::new();
    loop {
        lx.skip_ws();
        if lx.peek_is(b'<') {
            return Ok(words.join(" "));
        }
        words.push(lx.scan_text(token, "display name")?);
    }
}

fn parse_bracketed_uri(lx: &mut Lexer<'_>) -> Result<Uri, ParseError> {
    lx.match_char(b'<')?;
    let uri = lx.with_mode(LexerMode::Uri, |lx| parse_uri(lx, true))?;
    lx.match_char(b'>')?;
    Ok(uri)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::param::{GenericValue, Param, ParamList};

    fn parse(s: &str) -> Address {
        let mut lx = Lexer::new(s);
        let addr = parse_address(&mut lx).unwrap();
        lx.expect_end().unwrap();
        addr
    }

    #[test]
    fn quoted_display_name() {
        let addr = parse("\"Bob \\\"B\\\" Smith\" <sip:bob@biloxi.com>;tag=a6c85cf");
        assert_eq!(addr.display_name.as_deref(), Some("Bob \"B\" Smith"));
        assert_eq!(addr.uri.user.as_deref(), Some("bob"));
        assert_eq!(addr.tag(), Some("a6c85cf"));
    }

    #[test]
    fn token_display_name() {
        let addr = parse("Alice Liddell <sip:alice@atlanta.com>");
        assert_eq!(addr.display_name.as_deref(), Some("Alice Liddell"));
    }

    #[test]
    fn addr_spec_params_belong_to_header() {
        let addr = parse("sip:carol@chicago.com;tag=887s");
        assert_eq!(addr.display_name, None);
        assert!(addr.uri.params.is_empty());
        assert_eq!(addr.params, vec![Param::Tag("887s".into())]);
    }

    #[test]
    fn bracketed_uri_keeps_its_params() {
        let addr = parse("<sip:p1.example.com;lr>;x=\"1\"");
        assert!(addr.uri.is_loose_router());
        assert_eq!(addr.params, vec![Param::Other("x".into(), Some(GenericValue::Quoted("1".into())))]);
    }

    #[test]
    fn unterminated_bracket_fails() {
        let mut lx = Lexer::new("<sip:bob@biloxi.com");
        assert!(parse_address(&mut lx).is_err());
    }
}
