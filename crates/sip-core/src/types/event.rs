use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::param::{write_params, Param, ParamList};

/// Event header value (RFC 6665): `event-type *( ;event-param )`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventType {
    pub package: String,
    pub params: Vec<Param>,
}

impl EventType {
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            params: Vec::new(),
        }
    }

    pub fn id(&self) -> Option<String> {
        self.param("id").and_then(|p| p.value())
    }
}

impl ParamList for EventType {
    fn params(&self) -> &[Param] {
        &self.params
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.package)?;
        write_params(f, &self.params)
    }
}
