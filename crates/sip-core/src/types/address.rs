use std::fmt;

use serde::{Deserialize, Serialize};

use crate::parser::chars::{escape_quoted, is_token_char};
use crate::types::param::{set_param, write_params, Param, ParamList};
use crate::types::uri::Uri;

/// A `name-addr` / `addr-spec` with header parameters, as carried by From,
/// To, Contact, Route, Record-Route and Refer-To.
///
/// Always encoded in the bracketed `name-addr` form so that any URI
/// parameters stay with the URI and header parameters stay with the header.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub display_name: Option<String>,
    pub uri: Uri,
    pub params: Vec<Param>,
}

impl Address {
    pub fn new(uri: Uri) -> Self {
        Self {
            display_name: None,
            uri,
            params: Vec::new(),
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.set_tag(tag);
        self
    }

    pub fn with_param(mut self, param: Param) -> Self {
        set_param(&mut self.params, param);
        self
    }

    pub fn set_tag(&mut self, tag: impl Into<String>) {
        set_param(&mut self.params, Param::Tag(tag.into()));
    }

    /// `expires` header parameter, as found on Contact.
    pub fn expires(&self) -> Option<u32> {
        self.params.iter().find_map(|p| match p {
            Param::Expires(secs) => Some(*secs),
            _ => None,
        })
    }
}

impl ParamList for Address {
    fn params(&self) -> &[Param] {
        &self.params
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.display_name {
            if !name.is_empty() && name.split(' ').all(|w| !w.is_empty() && w.bytes().all(is_token_char)) {
                write!(f, "{} ", name)?;
            } else {
                write!(f, "\"{}\" ", escape_quoted(name))?;
            }
        }
        write!(f, "<{}>", self.uri)?;
        write_params(f, &self.params)
    }
}
