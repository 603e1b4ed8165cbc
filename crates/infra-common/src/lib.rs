//! Infrastructure shared by the sipwire crates.
//!
//! - [`logging`]: installs the `tracing` subscriber used by every crate.
//! - [`config`]: the [`StackConfig`] surface read by the transport,
//!   transaction and dialog layers (timers, framing limits, logging).
//!
//! Nothing in here keeps global mutable state. A [`StackConfig`] is loaded
//! once by the embedding application and handed to whichever component
//! needs it.

pub mod config;
pub mod errors;
pub mod logging;

pub use config::StackConfig;
pub use errors::{Error, Result};
pub use logging::{setup_logging, LoggingConfig};
