use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::param::{set_param, write_params, Param, ParamList};
use crate::types::uri::Host;

/// RFC 3261 magic cookie that prefixes every compliant branch
pub const BRANCH_MAGIC_COOKIE: &str = "z9hG4bK";

/// One `via-parm`: `SIP/2.0/UDP host:port;branch=...`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViaHeader {
    pub protocol: String,
    pub version: String,
    pub transport: String,
    pub host: Host,
    pub port: Option<u16>,
    pub params: Vec<Param>,
}

impl ViaHeader {
    pub fn new(transport: impl Into<String>, host: Host, port: Option<u16>, branch: impl Into<String>) -> Self {
        Self {
            protocol: "SIP".to_string(),
            version: "2.0".to_string(),
            transport: transport.into().to_ascii_uppercase(),
            host,
            port,
            params: vec![Param::Branch(branch.into())],
        }
    }

    pub fn branch(&self) -> Option<&str> {
        self.params.iter().find_map(|p| match p {
            Param::Branch(b) => Some(b.as_str()),
            _ => None,
        })
    }

    pub fn received(&self) -> Option<&str> {
        self.params.iter().find_map(|p| match p {
            Param::Received(r) => Some(r.as_str()),
            _ => None,
        })
    }

    pub fn rport(&self) -> Option<Option<u16>> {
        self.params.iter().find_map(|p| match p {
            Param::Rport(port) => Some(*port),
            _ => None,
        })
    }

    pub fn set_param(&mut self, param: Param) {
        set_param(&mut self.params, param);
    }

    /// `host[:port]` of the sender.
    pub fn sent_by(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.to_string(),
        }
    }

    pub fn is_reliable(&self) -> bool {
        !self.transport.eq_ignore_ascii_case("UDP")
    }
}

impl ParamList for ViaHeader {
    fn params(&self) -> &[Param] {
        &self.params
    }
}

impl fmt::Display for ViaHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{} {}", self.protocol, self.version, self.transport, self.sent_by())?;
        write_params(f, &self.params)
    }
}
