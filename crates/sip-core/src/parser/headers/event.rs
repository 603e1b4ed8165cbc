use crate::error::ParseError;
use crate::parser::chars::token;
use crate::parser::lexer::Lexer;
use crate::parser::params::parse_params;
use crate::types::event::EventType;
use crate::types::header::HeaderValue;

/// `Event: event-type *( SEMI event-param )`
pub fn parse_event(lx: &mut Lexer<'_>) -> Result<HeaderValue, ParseError> {
    let package = lx.scan_text(token, "event package")?;
    let mut event = EventType::new(package);
    event.params = parse_params(lx)?;
    Ok(HeaderValue::Event(event))
}
