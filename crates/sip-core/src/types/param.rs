//! Header and URI parameters (`;name=value`).
//!
//! Well-known parameters get their own [`Param`] variant so callers can match
//! on them directly; everything else lands in [`Param::Other`] with its name
//! and value preserved as received.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::parser::chars::escape_quoted;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GenericValue {
    Token(String),
    Quoted(String),
}

impl GenericValue {
    pub fn as_str(&self) -> &str {
        match self {
            GenericValue::Token(s) | GenericValue::Quoted(s) => s,
        }
    }
}

impl fmt::Display for GenericValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenericValue::Token(s) => f.write_str(s),
            GenericValue::Quoted(s) => write!(f, "\"{}\"", escape_quoted(s)),
        }
    }
}

impl From<&str> for GenericValue {
    fn from(s: &str) -> Self {
        if !s.is_empty() && s.bytes().all(crate::parser::chars::is_param_value_char) {
            GenericValue::Token(s.to_string())
        } else {
            GenericValue::Quoted(s.to_string())
        }
    }
}

impl From<String> for GenericValue {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Param {
    Branch(String),
    Tag(String),
    Expires(u32),
    Received(String),
    Maddr(String),
    Ttl(u8),
    Lr,
    Transport(String),
    Rport(Option<u16>),
    Other(String, Option<GenericValue>),
}

impl Param {
    pub fn branch(branch: impl Into<String>) -> Self {
        Param::Branch(branch.into())
    }

    pub fn tag(tag: impl Into<String>) -> Self {
        Param::Tag(tag.into())
    }

    pub fn transport(transport: impl Into<String>) -> Self {
        Param::Transport(transport.into())
    }

    pub fn new(name: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        Param::Other(name.into(), value.map(|v| GenericValue::from(v.into())))
    }

    /// Build the typed variant for a parsed `name[=value]` pair.
    ///
    /// Falls back to [`Param::Other`] whenever the value does not fit the
    /// typed representation, so nothing the peer sent is lost.
    pub fn from_parts(name: &str, value: Option<GenericValue>) -> Self {
        let token = match &value {
            Some(GenericValue::Token(t)) => Some(t.as_str()),
            _ => None,
        };
        let typed = match (name.to_ascii_lowercase().as_str(), token, &value) {
            ("branch", Some(v), _) => Some(Param::Branch(v.to_string())),
            ("tag", Some(v), _) => Some(Param::Tag(v.to_string())),
            ("expires", Some(v), _) => v.parse().ok().map(Param::Expires),
            ("received", Some(v), _) => Some(Param::Received(v.to_string())),
            ("maddr", Some(v), _) => Some(Param::Maddr(v.to_string())),
            ("ttl", Some(v), _) => v.parse().ok().map(Param::Ttl),
            ("lr", _, None) => Some(Param::Lr),
            ("transport", Some(v), _) => Some(Param::Transport(v.to_string())),
            ("rport", None, None) => Some(Param::Rport(None)),
            ("rport", Some(v), _) => v.parse().ok().map(|p| Param::Rport(Some(p))),
            _ => None,
        };
        typed.unwrap_or_else(|| Param::Other(name.to_string(), value))
    }

    pub fn key(&self) -> &str {
        match self {
            Param::Branch(_) => "branch",
            Param::Tag(_) => "tag",
            Param::Expires(_) => "expires",
            Param::Received(_) => "received",
            Param::Maddr(_) => "maddr",
            Param::Ttl(_) => "ttl",
            Param::Lr => "lr",
            Param::Transport(_) => "transport",
            Param::Rport(_) => "rport",
            Param::Other(name, _) => name,
        }
    }

    pub fn value(&self) -> Option<String> {
        match self {
            Param::Branch(v)
            | Param::Tag(v)
            | Param::Received(v)
            | Param::Maddr(v)
            | Param::Transport(v) => Some(v.clone()),
            Param::Expires(v) => Some(v.to_string()),
            Param::Ttl(v) => Some(v.to_string()),
            Param::Rport(port) => port.map(|p| p.to_string()),
            Param::Lr => None,
            Param::Other(_, value) => value.as_ref().map(|v| v.as_str().to_string()),
        }
    }

    /// Case-insensitive name comparison, as parameter names are tokens.
    pub fn is_named(&self, name: &str) -> bool {
        self.key().eq_ignore_ascii_case(name)
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Lr => f.write_str("lr"),
            Param::Rport(None) => f.write_str("rport"),
            Param::Other(name, None) => f.write_str(name),
            Param::Other(name, Some(value)) => write!(f, "{}={}", name, value),
            other => match other.value() {
                Some(value) => write!(f, "{}={}", other.key(), value),
                None => f.write_str(other.key()),
            },
        }
    }
}

/// Lookup helpers shared by every parameterised value.
pub trait ParamList {
    fn params(&self) -> &[Param];

    fn param(&self, name: &str) -> Option<&Param> {
        self.params().iter().find(|p| p.is_named(name))
    }

    fn has_param(&self, name: &str) -> bool {
        self.param(name).is_some()
    }

    fn tag(&self) -> Option<&str> {
        self.params().iter().find_map(|p| match p {
            Param::Tag(tag) => Some(tag.as_str()),
            _ => None,
        })
    }
}

impl ParamList for Vec<Param> {
    fn params(&self) -> &[Param] {
        self
    }
}

/// Render `;a=b;c` for a parameter list.
pub(crate) fn write_params(f: &mut fmt::Formatter<'_>, params: &[Param]) -> fmt::Result {
    for param in params {
        write!(f, ";{}", param)?;
    }
    Ok(())
}

/// Replace the first parameter called `name` or append `param`.
pub(crate) fn set_param(params: &mut Vec<Param>, param: Param) {
    let name = param.key().to_string();
    match params.iter_mut().find(|p| p.is_named(&name)) {
        Some(existing) => *existing = param,
        None => params.push(param),
    }
}
