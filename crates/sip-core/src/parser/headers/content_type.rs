use crate::error::ParseError;
use crate::parser::chars::token;
use crate::parser::lexer::Lexer;
use crate::parser::params::parse_params;
use crate::types::header::HeaderValue;
use crate::types::media_type::MediaType;

/// `m-type SLASH m-subtype *(SEMI m-parameter)`
pub fn parse_content_type(lx: &mut Lexer<'_>) -> Result<HeaderValue, ParseError> {
    let mtype = lx.scan_text(token, "media type")?;
    lx.skip_ws();
    lx.match_char(b'/')?;
    lx.skip_ws();
    let subtype = lx.scan_text(token, "media subtype")?;
    let mut media = MediaType::new(mtype, subtype);
    media.params = parse_params(lx)?;
    Ok(HeaderValue::ContentType(media))
}
