use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl Version {
    pub fn new(major: u8, minor: u8) -> Self {
        Version { major, minor }
    }

    pub fn sip_2_0() -> Self {
        Version { major: 2, minor: 0 }
    }
}

impl Default for Version {
    fn default() -> Self {
        Version::sip_2_0()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIP/{}.{}", self.major, self.minor)
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let rest = s
            .get(..4)
            .filter(|prefix| prefix.eq_ignore_ascii_case("SIP/"))
            .map(|_| &s[4..])
            .ok_or_else(|| Error::InvalidVersion(s.to_string()))?;
        let (major, minor) = rest
            .split_once('.')
            .ok_or_else(|| Error::InvalidVersion(s.to_string()))?;
        let major = major.parse().map_err(|_| Error::InvalidVersion(s.to_string()))?;
        let minor = minor.parse().map_err(|_| Error::InvalidVersion(s.to_string()))?;
        Ok(Version { major, minor })
    }
}
