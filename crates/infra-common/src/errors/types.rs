use std::path::PathBuf;

use thiserror::Error;

/// Result type for infrastructure operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading configuration or installing logging
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// A configuration file could not be read
    #[error("Failed to read configuration file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML syntax or type mismatch
    #[error("Invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON syntax or type mismatch
    #[error("Invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// The global subscriber could not be installed
    #[error("Logging setup failed: {0}")]
    Logging(String),
}
