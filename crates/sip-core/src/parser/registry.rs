//! Name-keyed dispatch from a header line to its grammar.
//!
//! The table is filled once from [`HeaderName::standard`] and read without
//! locking afterwards. Names missing from the table are not errors: the
//! header is kept as [`HeaderValue::Raw`] with its name and text unchanged.

use std::collections::HashMap;
use std::sync::Arc;

use lazy_static::lazy_static;
use tracing::trace;

use super::chars::token;
use super::headers;
use super::lexer::Lexer;
use crate::error::ParseError;
use crate::types::header::{Header, HeaderName, HeaderValue};

/// A header grammar: lexer positioned at the start of the value in, typed
/// value out.
pub type HeaderGrammar = for<'a> fn(&mut Lexer<'a>) -> Result<HeaderValue, ParseError>;

#[derive(Clone)]
struct Entry {
    name: HeaderName,
    grammar: HeaderGrammar,
}

/// Lower-cased header name or compact alias to grammar.
#[derive(Clone, Default)]
pub struct HeaderParserRegistry {
    entries: HashMap<String, Entry>,
}

lazy_static! {
    static ref STANDARD_REGISTRY: Arc<HeaderParserRegistry> = Arc::new(HeaderParserRegistry::standard());
}

/// The shared, read-only registry of every built-in grammar.
pub fn standard_registry() -> Arc<HeaderParserRegistry> {
    Arc::clone(&STANDARD_REGISTRY)
}

fn grammar_for(name: &HeaderName) -> Option<HeaderGrammar> {
    let grammar: HeaderGrammar = match name {
        HeaderName::Via => headers::parse_via,
        HeaderName::From => headers::parse_from,
        HeaderName::To => headers::parse_to,
        HeaderName::CallId => headers::parse_call_id,
        HeaderName::CSeq => headers::parse_cseq,
        HeaderName::Contact => headers::parse_contact,
        HeaderName::ContentLength | HeaderName::MaxForwards | HeaderName::Expires => headers::parse_number,
        HeaderName::ContentType => headers::parse_content_type,
        HeaderName::ContentEncoding
        | HeaderName::Supported
        | HeaderName::Require
        | HeaderName::AllowEvents => headers::parse_token_list,
        HeaderName::Route => headers::parse_route,
        HeaderName::RecordRoute => headers::parse_record_route,
        HeaderName::ReferTo => headers::parse_refer_to,
        HeaderName::Allow => headers::parse_allow,
        HeaderName::Event => headers::parse_event,
        HeaderName::Subject => headers::parse_subject,
        HeaderName::Other(_) => return None,
    };
    Some(grammar)
}

impl HeaderParserRegistry {
    /// An empty registry; every header parses as raw.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in grammar under its full name and
    /// compact alias.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for name in HeaderName::standard() {
            if let Some(grammar) = grammar_for(name) {
                registry.register(name.clone(), grammar);
            }
        }
        registry
    }

    /// Register `grammar` for `name` and its compact alias, replacing any
    /// previous entry.
    pub fn register(&mut self, name: HeaderName, grammar: HeaderGrammar) {
        if let Some(compact) = name.compact_form() {
            self.entries.insert(
                compact.to_string(),
                Entry {
                    name: name.clone(),
                    grammar,
                },
            );
        }
        self.entries
            .insert(name.as_str().to_ascii_lowercase(), Entry { name, grammar });
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Canonical name and grammar for a name as written on the wire.
    pub fn lookup(&self, name: &str) -> Option<(&HeaderName, HeaderGrammar)> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|entry| (&entry.name, entry.grammar))
    }

    /// Parse one unfolded header line: `name HCOLON value`.
    pub fn parse_header_line(&self, line: &str) -> Result<Header, ParseError> {
        let mut lx = Lexer::new(line);
        let name = lx.scan_text(token, "header name")?;
        lx.skip_ws();
        lx.match_char(b':')?;
        lx.skip_ws();

        match self.lookup(name) {
            Some((canonical, grammar)) => {
                trace!(header = %canonical, "dispatching header grammar");
                let value = grammar(&mut lx)?;
                lx.expect_end()?;
                Ok(Header::new(canonical.clone(), value))
            }
            None => {
                let text = lx.consume_rest().trim_end();
                Ok(Header::raw(HeaderName::Other(name.to_string()), text))
            }
        }
    }

    /// Parse a value for an already-known name, e.g. a header built by hand
    /// from raw text.
    pub fn parse_value(&self, name: &HeaderName, value: &str) -> Result<HeaderValue, ParseError> {
        match self.lookup(name.as_str()) {
            Some((_, grammar)) => {
                let mut lx = Lexer::new(value);
                lx.skip_ws();
                let parsed = grammar(&mut lx)?;
                lx.expect_end()?;
                Ok(parsed)
            }
            None => Ok(HeaderValue::Raw(value.trim().to_string())),
        }
    }
}

impl std::fmt::Debug for HeaderParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.entries.keys().collect();
        names.sort();
        f.debug_struct("HeaderParserRegistry").field("names", &names).finish()
    }
}
