//! SIP and SIPS URIs (RFC 3261 section 19.1).
//!
//! ```text
//! sip:user:password@host:port;uri-parameters?headers
//! ```

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::parser::{lexer::Lexer, uri::parse_uri};
use crate::types::param::{set_param, write_params, Param, ParamList};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scheme {
    Sip,
    Sips,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Sip => "sip",
            Scheme::Sips => "sips",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("sip") {
            Ok(Scheme::Sip)
        } else if s.eq_ignore_ascii_case("sips") {
            Ok(Scheme::Sips)
        } else {
            Err(Error::InvalidUri(format!("unsupported scheme '{}'", s)))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Host {
    Domain(String),
    Address(IpAddr),
}

impl Host {
    pub fn domain(domain: impl Into<String>) -> Self {
        Host::Domain(domain.into())
    }

    /// Interpret a host string (IPv6 may be bracketed).
    pub fn parse(text: &str) -> Self {
        let bare = text.trim_start_matches('[').trim_end_matches(']');
        match bare.parse::<IpAddr>() {
            Ok(ip) => Host::Address(ip),
            Err(_) => Host::Domain(text.to_string()),
        }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Host::Domain(domain) => f.write_str(domain),
            Host::Address(IpAddr::V4(ip)) => write!(f, "{}", ip),
            Host::Address(IpAddr::V6(ip)) => write!(f, "[{}]", ip),
        }
    }
}

impl From<IpAddr> for Host {
    fn from(ip: IpAddr) -> Self {
        Host::Address(ip)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Uri {
    pub scheme: Scheme,
    pub user: Option<String>,
    pub password: Option<String>,
    pub host: Host,
    pub port: Option<u16>,
    pub params: Vec<Param>,
    pub headers: Vec<(String, String)>,
}

impl Uri {
    pub fn new(scheme: Scheme, host: Host) -> Self {
        Self {
            scheme,
            user: None,
            password: None,
            host,
            port: None,
            params: Vec::new(),
            headers: Vec::new(),
        }
    }

    pub fn sip(host: impl Into<String>) -> Self {
        Self::new(Scheme::Sip, Host::parse(&host.into()))
    }

    pub fn sips(host: impl Into<String>) -> Self {
        Self::new(Scheme::Sips, Host::parse(&host.into()))
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_param(mut self, param: Param) -> Self {
        set_param(&mut self.params, param);
        self
    }

    pub fn username(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn transport(&self) -> Option<&str> {
        self.params.iter().find_map(|p| match p {
            Param::Transport(t) => Some(t.as_str()),
            _ => None,
        })
    }

    /// Loose-routing marker on a Route / Record-Route URI.
    pub fn is_loose_router(&self) -> bool {
        self.params.iter().any(|p| matches!(p, Param::Lr))
    }
}

impl ParamList for Uri {
    fn params(&self) -> &[Param] {
        &self.params
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.scheme)?;
        if let Some(user) = &self.user {
            f.write_str(user)?;
            if let Some(password) = &self.password {
                write!(f, ":{}", password)?;
            }
            f.write_str("@")?;
        }
        write!(f, "{}", self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        write_params(f, &self.params)?;
        for (i, (name, value)) in self.headers.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{}{}={}", sep, name, value)?;
        }
        Ok(())
    }
}

impl FromStr for Uri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut lexer = Lexer::new(s);
        let uri = parse_uri(&mut lexer, true)?;
        lexer.expect_end()?;
        Ok(uri)
    }
}
