use crate::error::ParseError;
use crate::parser::chars::{digits, token};
use crate::parser::lexer::Lexer;
use crate::types::cseq::CSeq;
use crate::types::header::HeaderValue;
use crate::types::method::Method;

/// `CSeq: 1*DIGIT LWS Method`
pub fn parse_cseq(lx: &mut Lexer<'_>) -> Result<HeaderValue, ParseError> {
    let start = lx.offset();
    let seq = lx.scan_text(digits, "sequence number")?;
    let seq = seq
        .parse::<u32>()
        .ok()
        .filter(|n| *n <= CSeq::MAX_SEQ)
        .ok_or_else(|| ParseError::grammar(lx.input(), start, format!("sequence number '{}' out of range", seq)))?;

    let before_method = lx.offset();
    lx.skip_ws();
    if lx.offset() == before_method {
        return Err(lx.grammar_error("expected whitespace before method"));
    }
    let method_start = lx.offset();
    let method = lx.scan_text(token, "method")?;
    let method = method
        .parse::<Method>()
        .map_err(|e| ParseError::grammar(lx.input(), method_start, e.to_string()))?;
    Ok(HeaderValue::CSeq(CSeq::new(seq, method)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseErrorKind;

    #[test]
    fn parses_number_and_method() {
        let mut lx = Lexer::new("314159 INVITE");
        assert_eq!(parse_cseq(&mut lx).unwrap(), HeaderValue::CSeq(CSeq::new(314159, Method::Invite)));
        let mut lx = Lexer::new("7 X-CUSTOM");
        assert_eq!(
            parse_cseq(&mut lx).unwrap(),
            HeaderValue::CSeq(CSeq::new(7, Method::Extension("X-CUSTOM".into())))
        );
    }

    #[test]
    fn rejects_oversized_sequence() {
        let mut lx = Lexer::new("4294967296 INVITE");
        assert_eq!(parse_cseq(&mut lx).unwrap_err().kind, ParseErrorKind::Grammar);
        let mut lx = Lexer::new("2147483648 BYE");
        assert!(parse_cseq(&mut lx).is_err());
    }

    #[test]
    fn method_is_required() {
        let mut lx = Lexer::new("12");
        assert!(parse_cseq(&mut lx).is_err());
    }
}
