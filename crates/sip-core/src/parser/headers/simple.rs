//! Single-valued headers: numbers, Call-ID and free text.

use crate::error::ParseError;
use crate::parser::chars::{digits, word};
use crate::parser::lexer::Lexer;
use crate::types::header::HeaderValue;

/// Content-Length, Max-Forwards, Expires: `1*DIGIT`
pub fn parse_number(lx: &mut Lexer<'_>) -> Result<HeaderValue, ParseError> {
    let start = lx.offset();
    let text = lx.scan_text(digits, "number")?;
    text.parse::<u32>()
        .map(HeaderValue::Number)
        .map_err(|_| ParseError::grammar(lx.input(), start, format!("number '{}' out of range", text)))
}

/// `callid = word [ "@" word ]`
pub fn parse_call_id(lx: &mut Lexer<'_>) -> Result<HeaderValue, ParseError> {
    let local = lx.scan_text(word, "Call-ID")?;
    let call_id = if lx.accept_char(b'@') {
        format!("{}@{}", local, lx.scan_text(word, "Call-ID host")?)
    } else {
        local.to_string()
    };
    Ok(HeaderValue::CallId(call_id))
}

/// Subject: the trimmed remainder, possibly empty.
pub fn parse_subject(lx: &mut Lexer<'_>) -> Result<HeaderValue, ParseError> {
    Ok(HeaderValue::Text(lx.consume_rest().trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers() {
        let mut lx = Lexer::new("70");
        assert_eq!(parse_number(&mut lx).unwrap(), HeaderValue::Number(70));
        let mut lx = Lexer::new("-1");
        assert!(parse_number(&mut lx).is_err());
        let mut lx = Lexer::new("99999999999");
        assert!(parse_number(&mut lx).is_err());
    }

    #[test]
    fn call_id_with_host() {
        let mut lx = Lexer::new("a84b4c76e66710@pc33.atlanta.com");
        assert_eq!(
            parse_call_id(&mut lx).unwrap(),
            HeaderValue::CallId("a84b4c76e66710@pc33.atlanta.com".into())
        );
        let mut lx = Lexer::new("f81d4fae-7dec-11d0-a765-00a0c91e6bf6");
        assert!(matches!(parse_call_id(&mut lx).unwrap(), HeaderValue::CallId(_)));
        assert!(lx.is_at_end());
    }
}
