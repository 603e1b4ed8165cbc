//! Shared `*( SEMI generic-param )` grammar.
//!
//! Every header with trailing parameters calls [`parse_params`] rather than
//! carrying its own parameter rules, which keeps all of them extensible.

use nom::bytes::complete::take_while1;

use super::chars::{is_param_value_char, quoted_string, token, unescape_quoted, ParseResult};
use super::lexer::Lexer;
use crate::error::ParseError;
use crate::types::param::{GenericValue, Param};

fn param_value(input: &[u8]) -> ParseResult<'_, &[u8]> {
    take_while1(is_param_value_char)(input)
}

/// `gen-value = token / host / quoted-string`
pub fn parse_generic_value(lx: &mut Lexer<'_>) -> Result<GenericValue, ParseError> {
    if lx.peek_is(b'"') {
        let raw = lx.scan_text(quoted_string, "quoted-string")?;
        Ok(GenericValue::Quoted(unescape_quoted(raw)))
    } else {
        let text = lx.scan_text(param_value, "parameter value")?;
        Ok(GenericValue::Token(text.to_string()))
    }
}

/// One `name [ EQUAL gen-value ]`, the leading `;` already consumed.
pub fn parse_param(lx: &mut Lexer<'_>) -> Result<Param, ParseError> {
    lx.skip_ws();
    let name = lx.scan_text(token, "parameter name")?;

    let before_eq = lx.mark();
    lx.skip_ws();
    if lx.accept_char(b'=') {
        lx.release(before_eq);
        lx.skip_ws();
        let value = parse_generic_value(lx)?;
        Ok(Param::from_parts(name, Some(value)))
    } else {
        lx.rewind(before_eq);
        Ok(Param::from_parts(name, None))
    }
}

/// Zero or more `;param`s. Stops, without consuming, at the first
/// character that does not start another parameter.
pub fn parse_params(lx: &mut Lexer<'_>) -> Result<Vec<Param>, ParseError> {
    let mut params = Vec::new();
    loop {
        let before = lx.mark();
        lx.skip_ws();
        if !lx.accept_char(b';') {
            lx.rewind(before);
            return Ok(params);
        }
        lx.release(before);
        params.push(parse_param(lx)?);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_and_generic_params() {
        let mut lx = Lexer::new(";branch=z9hG4bK776 ; rport;received=192.0.2.1;x-id=\"a b\"");
        let params = parse_params(&mut lx).unwrap();
        assert_eq!(
            params,
            vec![
                Param::Branch("z9hG4bK776".into()),
                Param::Rport(None),
                Param::Received("192.0.2.1".into()),
                Param::Other("x-id".into(), Some(GenericValue::Quoted("a b".into()))),
            ]
        );
        assert!(lx.is_at_end());
    }

    #[test]
    fn stops_before_list_separator() {
        let mut lx = Lexer::new(";lr , <sip:next>");
        assert_eq!(parse_params(&mut lx).unwrap(), vec![Param::Lr]);
        assert_eq!(lx.remaining(), " , <sip:next>");
    }

    #[test]
    fn missing_name_is_an_error() {
        let mut lx = Lexer::new(";=value");
        assert!(parse_params(&mut lx).is_err());
    }

    #[test]
    fn ipv6_values_stay_unquoted() {
        let mut lx = Lexer::new(";received=[2001:db8::9]");
        assert_eq!(
            parse_params(&mut lx).unwrap(),
            vec![Param::Received("[2001:db8::9]".into())]
        );
    }
}
