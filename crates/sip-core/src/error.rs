use std::fmt;
use std::io;

use thiserror::Error;

/// Result type for SIP core operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseErrorKind {
    /// Unexpected character or token
    Lexical,
    /// Well-formed tokens in an invalid arrangement
    Grammar,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorKind::Lexical => f.write_str("lexical"),
            ParseErrorKind::Grammar => f.write_str("grammar"),
        }
    }
}

/// A parse failure, pinned to the buffer being parsed and the offset of the
/// offending input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} error at offset {offset}: {message} (in {buffer:?})")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    pub buffer: String,
    pub offset: usize,
}

impl ParseError {
    pub fn lexical(buffer: &str, offset: usize, message: impl Into<String>) -> Self {
        Self {
            kind: ParseErrorKind::Lexical,
            message: message.into(),
            buffer: buffer.to_string(),
            offset,
        }
    }

    pub fn grammar(buffer: &str, offset: usize, message: impl Into<String>) -> Self {
        Self {
            kind: ParseErrorKind::Grammar,
            message: message.into(),
            buffer: buffer.to_string(),
            offset,
        }
    }

    /// The unparsed tail starting at the error offset.
    pub fn remainder(&self) -> &str {
        self.buffer.get(self.offset..).unwrap_or("")
    }
}

/// Errors that can occur in SIP message handling
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Invalid message format: {0}")]
    InvalidFormat(String),

    #[error("Invalid SIP method: {0}")]
    InvalidMethod(String),

    #[error("Invalid status code: {0}")]
    InvalidStatusCode(u16),

    #[error("Invalid SIP version: {0}")]
    InvalidVersion(String),

    #[error("Invalid SIP URI: {0}")]
    InvalidUri(String),

    #[error("Invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("Missing required header: {0}")]
    MissingHeader(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Offset-carrying parse details, when this is a parse failure.
    pub fn as_parse_error(&self) -> Option<&ParseError> {
        match self {
            Error::Parse(e) => Some(e),
            _ => None,
        }
    }
}
