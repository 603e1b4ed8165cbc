//! Stream framing shared by connection-oriented transports.

mod framer;

pub use framer::{MessageSink, SipStreamCodec, StreamFramer};
