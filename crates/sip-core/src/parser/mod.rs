//! Lexer, grammars and message assembly.
//!
//! Every grammar is a plain function over a shared [`lexer::Lexer`]:
//! parameters and addresses are parsed by [`params`] and [`address`] and
//! reused by the header grammars in [`headers`], which the
//! [`registry::HeaderParserRegistry`] dispatches to by name.

pub mod address;
pub mod chars;
pub mod headers;
pub mod lexer;
pub mod message;
pub mod params;
pub mod registry;
pub mod uri;
pub mod utils;

pub use lexer::{Lexer, LexerMode, Mark, Token, TokenKind};
pub use message::{parse_message, HeaderErrorAction, HeaderErrorPolicy, LenientPolicy, MessageAssembler, StrictPolicy};
pub use registry::{standard_registry, HeaderGrammar, HeaderParserRegistry};
pub use utils::{find_header_end, scan_content_length, unfold_lines};
