use super::comma_list;
use crate::error::ParseError;
use crate::parser::address::parse_address;
use crate::parser::lexer::Lexer;
use crate::types::header::{ContactValue, HeaderValue};

pub fn parse_from(lx: &mut Lexer<'_>) -> Result<HeaderValue, ParseError> {
    parse_address(lx).map(HeaderValue::Address)
}

pub fn parse_to(lx: &mut Lexer<'_>) -> Result<HeaderValue, ParseError> {
    parse_address(lx).map(HeaderValue::Address)
}

pub fn parse_refer_to(lx: &mut Lexer<'_>) -> Result<HeaderValue, ParseError> {
    parse_address(lx).map(HeaderValue::Address)
}

pub fn parse_route(lx: &mut Lexer<'_>) -> Result<HeaderValue, ParseError> {
    comma_list(lx, parse_address).map(HeaderValue::AddressList)
}

pub fn parse_record_route(lx: &mut Lexer<'_>) -> Result<HeaderValue, ParseError> {
    comma_list(lx, parse_address).map(HeaderValue::AddressList)
}

/// `Contact: ( STAR / (contact-param *(COMMA contact-param)) )`
pub fn parse_contact(lx: &mut Lexer<'_>) -> Result<HeaderValue, ParseError> {
    lx.skip_ws();
    if lx.accept_char(b'*') {
        return Ok(HeaderValue::Contact(ContactValue::Wildcard));
    }
    comma_list(lx, parse_address).map(|addrs| HeaderValue::Contact(ContactValue::Addresses(addrs)))
}
