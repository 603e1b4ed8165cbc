//! Per-header grammars.
//!
//! Each grammar has the [`HeaderGrammar`](super::registry::HeaderGrammar)
//! shape: it receives a lexer positioned after `Name:` and its whitespace,
//! and returns the typed [`HeaderValue`](crate::types::header::HeaderValue).
//! Trailing input is checked by the registry, not here.

mod address;
mod content_type;
mod cseq;
mod event;
mod simple;
mod token_list;
mod via;

pub use address::{parse_contact, parse_from, parse_record_route, parse_refer_to, parse_route, parse_to};
pub use content_type::parse_content_type;
pub use cseq::parse_cseq;
pub use event::parse_event;
pub use simple::{parse_call_id, parse_number, parse_subject};
pub use token_list::{parse_allow, parse_token_list};
pub use via::{parse_via, parse_via_param};

use super::lexer::Lexer;
use crate::error::ParseError;

/// `item *(COMMA item)`, whitespace allowed around each comma.
pub(crate) fn comma_list<'a, T>(
    lx: &mut Lexer<'a>,
    mut item: impl FnMut(&mut Lexer<'a>) -> Result<T, ParseError>,
) -> Result<Vec<T>, ParseError> {
    let mut items = vec![item(lx)?];
    loop {
        let before = lx.mark();
        lx.skip_ws();
        if !lx.accept_char(b',') {
            lx.rewind(before);
            return Ok(items);
        }
        lx.release(before);
        lx.skip_ws();
        items.push(item(lx)?);
    }
}

/// Like [`comma_list`] but an empty value yields an empty list.
pub(crate) fn optional_comma_list<'a, T>(
    lx: &mut Lexer<'a>,
    item: impl FnMut(&mut Lexer<'a>) -> Result<T, ParseError>,
) -> Result<Vec<T>, ParseError> {
    lx.skip_ws();
    if lx.is_at_end() {
        return Ok(Vec::new());
    }
    comma_list(lx, item)
}
