use std::str::FromStr;

use super::optional_comma_list;
use crate::error::ParseError;
use crate::parser::chars::token;
use crate::parser::lexer::Lexer;
use crate::types::header::HeaderValue;
use crate::types::method::Method;

/// Supported, Require, Allow-Events, Content-Encoding: `[token *(COMMA token)]`
pub fn parse_token_list(lx: &mut Lexer<'_>) -> Result<HeaderValue, ParseError> {
    optional_comma_list(lx, |lx| lx.scan_text(token, "token").map(str::to_string)).map(HeaderValue::Tokens)
}

/// `Allow: [Method *(COMMA Method)]`
pub fn parse_allow(lx: &mut Lexer<'_>) -> Result<HeaderValue, ParseError> {
    optional_comma_list(lx, |lx| {
        let start = lx.offset();
        let text = lx.scan_text(token, "method")?;
        Method::from_str(text).map_err(|e| ParseError::grammar(lx.input(), start, e.to_string()))
    })
    .map(HeaderValue::Methods)
}
