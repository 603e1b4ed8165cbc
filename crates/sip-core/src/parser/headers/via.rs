use super::comma_list;
use crate::error::ParseError;
use crate::parser::chars::token;
use crate::parser::lexer::Lexer;
use crate::parser::params::parse_params;
use crate::parser::uri::{parse_host, parse_port};
use crate::types::header::HeaderValue;
use crate::types::via::ViaHeader;

/// `Via: 1#via-parm`
pub fn parse_via(lx: &mut Lexer<'_>) -> Result<HeaderValue, ParseError> {
    comma_list(lx, parse_via_param).map(HeaderValue::Via)
}

/// `sent-protocol LWS sent-by *( SEMI via-params )`
pub fn parse_via_param(lx: &mut Lexer<'_>) -> Result<ViaHeader, ParseError> {
    let protocol = lx.scan_text(token, "protocol name")?.to_string();
    lx.skip_ws();
    lx.match_char(b'/')?;
    lx.skip_ws();
    let version = lx.scan_text(token, "protocol version")?.to_string();
    lx.skip_ws();
    lx.match_char(b'/')?;
    lx.skip_ws();
    let transport = lx.scan_text(token, "transport")?.to_ascii_uppercase();

    let before_host = lx.offset();
    lx.skip_ws();
    if lx.offset() == before_host {
        return Err(lx.grammar_error("expected whitespace before sent-by"));
    }
    let host = parse_host(lx)?;
    let port = parse_port(lx)?;
    let params = parse_params(lx)?;

    Ok(ViaHeader {
        protocol,
        version,
        transport,
        host,
        port,
        params,
    })
}
