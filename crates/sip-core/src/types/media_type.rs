use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::param::{write_params, Param, ParamList};

/// `type/subtype;param=value` as carried by Content-Type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaType {
    pub mtype: String,
    pub subtype: String,
    pub params: Vec<Param>,
}

impl MediaType {
    pub fn new(mtype: impl Into<String>, subtype: impl Into<String>) -> Self {
        Self {
            mtype: mtype.into(),
            subtype: subtype.into(),
            params: Vec::new(),
        }
    }

    pub fn sdp() -> Self {
        Self::new("application", "sdp")
    }

    pub fn essence_eq(&self, other: &MediaType) -> bool {
        self.mtype.eq_ignore_ascii_case(&other.mtype) && self.subtype.eq_ignore_ascii_case(&other.subtype)
    }
}

impl ParamList for MediaType {
    fn params(&self) -> &[Param] {
        &self.params
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.mtype, self.subtype)?;
        write_params(f, &self.params)
    }
}
