//! Cursor-based lexer shared by every grammar in the crate.
//!
//! A [`Lexer`] walks a single header value (or start line) and hands out
//! [`Token`]s according to the active [`LexerMode`]. Grammars switch modes
//! mid-parse, e.g. from [`LexerMode::Core`] to [`LexerMode::Uri`] after a
//! `<`, and backtrack with [`Lexer::mark`] / [`Lexer::rewind`] where the
//! grammar is ambiguous until several tokens have been read
//! (`user:password@host` against `host:port`).
//!
//! The cursor only moves on success. A failed [`Lexer::match_char`] or
//! [`Lexer::match_kind`] leaves it where it was.

use nom::bytes::complete::{tag_no_case, take_while1};
use tracing::trace;

use super::chars::{is_host_char, is_token_char, is_user_char, sws, ParseResult};
use crate::error::ParseError;

/// Character-class rules the lexer tokenizes with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LexerMode {
    /// Header-value text: RFC 3261 `token` characters form identifiers
    Core,
    /// URI userinfo and parameters: unreserved, escapes and user specials
    Uri,
    /// Host names, IPv4 literals, and bracketed IPv6 references
    Host,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Identifier,
    /// Run of ASCII digits only
    Digits,
    /// Identifier that is a protocol keyword (`SIP`, method names)
    Keyword,
    /// Any other single character
    Punct(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub offset: usize,
}

/// Saved cursor position returned by [`Lexer::mark`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct Mark {
    pos: usize,
    depth: usize,
}

const KEYWORDS: &[&str] = &[
    "SIP", "SIPS", "INVITE", "ACK", "BYE", "CANCEL", "OPTIONS", "REGISTER", "SUBSCRIBE", "NOTIFY",
    "REFER", "INFO", "UPDATE", "PRACK", "MESSAGE", "PUBLISH",
];

#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    mode: LexerMode,
    marks: Vec<usize>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            mode: LexerMode::Core,
            marks: Vec::new(),
        }
    }

    /// Lexer positioned at `offset` inside a larger buffer, so reported
    /// offsets stay relative to the whole line.
    pub fn at(input: &'a str, offset: usize) -> Self {
        let mut lexer = Self::new(input);
        lexer.pos = offset.min(input.len());
        lexer
    }

    pub fn input(&self) -> &'a str {
        self.input
    }

    pub fn offset(&self) -> usize {
        self.pos
    }

    pub fn mode(&self) -> LexerMode {
        self.mode
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    pub fn remaining(&self) -> &'a str {
        self.input.get(self.pos..).unwrap_or("")
    }

    fn bytes(&self) -> &'a [u8] {
        self.input.as_bytes()
    }

    /// Switch tokenizing rules, returning the previous mode.
    pub fn select_lexer(&mut self, mode: LexerMode) -> LexerMode {
        trace!(from = ?self.mode, to = ?mode, offset = self.pos, "lexer mode switch");
        std::mem::replace(&mut self.mode, mode)
    }

    /// Run `f` under `mode` and restore the previous mode afterwards.
    pub fn with_mode<T>(&mut self, mode: LexerMode, f: impl FnOnce(&mut Self) -> T) -> T {
        let previous = self.select_lexer(mode);
        let result = f(self);
        self.mode = previous;
        result
    }

    /// Byte `n` positions ahead of the cursor, without consuming it.
    pub fn look_ahead(&self, n: usize) -> Option<u8> {
        self.bytes().get(self.pos + n).copied()
    }

    pub fn peek_is(&self, c: u8) -> bool {
        self.look_ahead(0) == Some(c)
    }

    /// Consume exactly `n` bytes.
    pub fn consume(&mut self, n: usize) -> Result<&'a str, ParseError> {
        let end = self.pos + n;
        let text = self
            .input
            .get(self.pos..end)
            .ok_or_else(|| self.lexical_error(format!("cannot consume {} bytes", n)))?;
        self.pos = end;
        Ok(text)
    }

    /// Consume everything left.
    pub fn consume_rest(&mut self) -> &'a str {
        let rest = self.remaining();
        self.pos = self.input.len();
        rest
    }

    pub fn match_char(&mut self, expected: u8) -> Result<(), ParseError> {
        match self.look_ahead(0) {
            Some(c) if c == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(c) => Err(self.lexical_error(format!(
                "expected '{}', found '{}'",
                expected as char,
                c.escape_ascii()
            ))),
            None => Err(self.lexical_error(format!(
                "expected '{}', found end of input",
                expected as char
            ))),
        }
    }

    /// Consume `expected` if it is next; never fails.
    pub fn accept_char(&mut self, expected: u8) -> bool {
        self.match_char(expected).is_ok()
    }

    /// Case-insensitive literal such as `SIP/`.
    pub fn match_literal(&mut self, literal: &str) -> Result<(), ParseError> {
        let result: ParseResult<'_, &[u8]> = tag_no_case(literal.as_bytes())(&self.bytes()[self.pos..]);
        match result {
            Ok(_) => {
                self.pos += literal.len();
                Ok(())
            }
            Err(_) => Err(self.lexical_error(format!("expected '{}'", literal))),
        }
    }

    pub fn match_kind(&mut self, kind: TokenKind) -> Result<Token<'a>, ParseError> {
        let start = self.pos;
        let token = self.next_token()?;
        let matches = token.kind == kind
            || (kind == TokenKind::Identifier && matches!(token.kind, TokenKind::Keyword | TokenKind::Digits));
        if matches {
            Ok(token)
        } else {
            self.pos = start;
            Err(ParseError::lexical(
                self.input,
                start,
                format!("expected {:?}, found {:?} '{}'", kind, token.kind, token.text),
            ))
        }
    }

    /// Next token under the current mode. Whitespace is not skipped; it
    /// comes back as a [`TokenKind::Punct`].
    pub fn next_token(&mut self) -> Result<Token<'a>, ParseError> {
        let start = self.pos;
        let c = self
            .look_ahead(0)
            .ok_or_else(|| self.lexical_error("unexpected end of input"))?;

        let kind = match self.mode {
            LexerMode::Core => self.scan_class(is_token_char),
            LexerMode::Uri => self.scan_class(is_user_char),
            LexerMode::Host if c == b'[' => self.scan_ipv6_reference()?,
            LexerMode::Host => self.scan_class(is_host_char),
        };

        let kind = match kind {
            Some(kind) => kind,
            None if c.is_ascii() => {
                self.pos += 1;
                TokenKind::Punct(c)
            }
            None => return Err(self.lexical_error("unexpected non-ASCII character")),
        };

        let text = self
            .input
            .get(start..self.pos)
            .ok_or_else(|| ParseError::lexical(self.input, start, "token splits a character"))?;
        trace!(?kind, text, offset = start, "token");
        Ok(Token { kind, text, offset: start })
    }

    /// Token ahead of the cursor, without consuming it.
    pub fn peek_token(&mut self) -> Result<Token<'a>, ParseError> {
        let start = self.pos;
        let token = self.next_token();
        self.pos = start;
        token
    }

    fn scan_class(&mut self, class: fn(u8) -> bool) -> Option<TokenKind> {
        let rest = &self.bytes()[self.pos..];
        let result: ParseResult<'_, &[u8]> = take_while1(class)(rest);
        let (_, run) = result.ok()?;
        self.pos += run.len();
        let kind = if run.iter().all(u8::is_ascii_digit) {
            TokenKind::Digits
        } else if self.mode == LexerMode::Core && KEYWORDS.iter().any(|k| k.as_bytes().eq_ignore_ascii_case(run)) {
            TokenKind::Keyword
        } else {
            TokenKind::Identifier
        };
        Some(kind)
    }

    fn scan_ipv6_reference(&mut self) -> Result<Option<TokenKind>, ParseError> {
        let rest = &self.bytes()[self.pos..];
        let close = rest
            .iter()
            .position(|&b| b == b']')
            .ok_or_else(|| self.lexical_error("unterminated IPv6 reference"))?;
        let inner = &rest[1..close];
        if inner.is_empty() || !inner.iter().all(|&b| b.is_ascii_hexdigit() || b == b':' || b == b'.') {
            return Err(self.lexical_error("invalid IPv6 reference"));
        }
        self.pos += close + 1;
        Ok(Some(TokenKind::Identifier))
    }

    /// Apply a nom parser at the cursor, advancing past what it consumed.
    pub fn scan<O>(
        &mut self,
        mut parser: impl FnMut(&'a [u8]) -> ParseResult<'a, O>,
        what: &str,
    ) -> Result<O, ParseError> {
        let rest = &self.bytes()[self.pos..];
        match parser(rest) {
            Ok((remaining, output)) => {
                self.pos += rest.len() - remaining.len();
                Ok(output)
            }
            Err(_) => Err(self.lexical_error(format!("expected {}", what))),
        }
    }

    /// Like [`Lexer::scan`] for parsers that recognise a slice, returning
    /// it as text.
    pub fn scan_text(
        &mut self,
        parser: impl FnMut(&'a [u8]) -> ParseResult<'a, &'a [u8]>,
        what: &str,
    ) -> Result<&'a str, ParseError> {
        let start = self.pos;
        let matched = self.scan(parser, what)?;
        // The match may sit inside what was consumed (quoted-string content)
        let text_start = matched.as_ptr() as usize - self.bytes().as_ptr() as usize;
        self.input
            .get(text_start..text_start + matched.len())
            .ok_or_else(|| ParseError::lexical(self.input, start, "match splits a character"))
    }

    /// Skip optional linear whitespace (folded or not).
    pub fn skip_ws(&mut self) {
        // sws never fails
        let _ = self.scan(sws, "whitespace");
    }

    /// Save the cursor for a later [`Lexer::rewind`].
    pub fn mark(&mut self) -> Mark {
        self.marks.push(self.pos);
        Mark {
            pos: self.pos,
            depth: self.marks.len() - 1,
        }
    }

    /// Restore the cursor saved by `mark`, dropping any newer marks.
    pub fn rewind(&mut self, mark: Mark) {
        self.pos = mark.pos;
        self.marks.truncate(mark.depth);
    }

    /// Forget `mark` without moving the cursor.
    pub fn release(&mut self, mark: Mark) {
        self.marks.truncate(mark.depth);
    }

    /// Run `f`; on failure the cursor returns to where it started.
    pub fn attempt<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        let mark = self.mark();
        let mode = self.mode;
        match f(self) {
            Ok(value) => {
                self.release(mark);
                Ok(value)
            }
            Err(e) => {
                self.rewind(mark);
                self.mode = mode;
                Err(e)
            }
        }
    }

    /// Trailing whitespace is allowed; anything else is a grammar error.
    pub fn expect_end(&mut self) -> Result<(), ParseError> {
        self.skip_ws();
        if self.is_at_end() {
            Ok(())
        } else {
            Err(self.grammar_error(format!("unexpected trailing input '{}'", self.remaining())))
        }
    }

    pub fn lexical_error(&self, message: impl Into<String>) -> ParseError {
        ParseError::lexical(self.input, self.pos, message)
    }

    pub fn grammar_error(&self, message: impl Into<String>) -> ParseError {
        ParseError::grammar(self.input, self.pos, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseErrorKind;

    #[test]
    fn tokens_carry_kind_text_and_offset() {
        let mut lx = Lexer::new("INVITE sip:bob 42");
        let t = lx.next_token().unwrap();
        assert_eq!((t.kind, t.text, t.offset), (TokenKind::Keyword, "INVITE", 0));
        assert_eq!(lx.next_token().unwrap().kind, TokenKind::Punct(b' '));
        assert_eq!(lx.next_token().unwrap().text, "sip");
        assert_eq!(lx.next_token().unwrap().kind, TokenKind::Punct(b':'));
        lx.match_kind(TokenKind::Identifier).unwrap();
        lx.skip_ws();
        let t = lx.next_token().unwrap();
        assert_eq!((t.kind, t.text, t.offset), (TokenKind::Digits, "42", 15));
        assert!(lx.is_at_end());
        assert!(lx.next_token().is_err());
    }

    #[test]
    fn failed_match_leaves_cursor_unchanged() {
        let mut lx = Lexer::new("abc;def");
        lx.match_kind(TokenKind::Identifier).unwrap();
        let err = lx.match_char(b',').unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::Lexical);
        assert_eq!(err.offset, 3);
        assert_eq!(lx.offset(), 3);
        assert!(lx.match_kind(TokenKind::Digits).is_err());
        assert_eq!(lx.offset(), 3);
        lx.match_char(b';').unwrap();
        assert_eq!(lx.remaining(), "def");
    }

    #[test]
    fn mark_and_rewind_backtrack() {
        let mut lx = Lexer::new("host:5060");
        let outer = lx.mark();
        lx.consume(5).unwrap();
        let inner = lx.mark();
        lx.consume(4).unwrap();
        lx.rewind(inner);
        assert_eq!(lx.remaining(), "5060");
        lx.rewind(outer);
        assert_eq!(lx.offset(), 0);
        assert!(lx.consume(100).is_err());
    }

    #[test]
    fn modes_change_character_classes() {
        let mut lx = Lexer::new("al%20ice@[2001:db8::1]");
        lx.select_lexer(LexerMode::Uri);
        assert_eq!(lx.next_token().unwrap().text, "al%20ice");
        lx.match_char(b'@').unwrap();
        let previous = lx.select_lexer(LexerMode::Host);
        assert_eq!(previous, LexerMode::Uri);
        assert_eq!(lx.next_token().unwrap().text, "[2001:db8::1]");

        let mut core = Lexer::new("al%20ice@x");
        assert_eq!(core.next_token().unwrap().text, "al%20ice");
        assert_eq!(core.next_token().unwrap().kind, TokenKind::Punct(b'@'));
    }

    #[test]
    fn attempt_restores_cursor_and_mode() {
        let mut lx = Lexer::new("user@host");
        let result: Result<(), ParseError> = lx.attempt(|lx| {
            lx.select_lexer(LexerMode::Host);
            lx.next_token()?;
            lx.match_char(b':')
        });
        assert!(result.is_err());
        assert_eq!(lx.offset(), 0);
        assert_eq!(lx.mode(), LexerMode::Core);
    }

    #[test]
    fn literal_matching_is_case_insensitive() {
        let mut lx = Lexer::new("sip/2.0");
        lx.match_literal("SIP/").unwrap();
        assert_eq!(lx.remaining(), "2.0");
        assert!(lx.match_literal("x").is_err());
    }

    #[test]
    fn expect_end_reports_grammar_error() {
        let mut lx = Lexer::new("70 junk");
        lx.match_kind(TokenKind::Digits).unwrap();
        let err = lx.expect_end().unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::Grammar);
        assert_eq!(err.offset, 3);
    }
}
