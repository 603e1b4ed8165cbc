//! SIP message model and parsers.
//!
//! Wire text goes in through [`parser::MessageAssembler`] (or
//! [`parse_message`] for a complete buffer) and comes out as a typed
//! [`Message`]; [`Message::to_bytes`] goes the other way.
//!
//! ```
//! use sipwire_sip_core::prelude::*;
//!
//! let msg = parse_message(
//!     b"OPTIONS sip:carol@chicago.com SIP/2.0\r\n\
//!       Via: SIP/2.0/UDP pc33.atlanta.com;branch=z9hG4bKhjhs8ass877\r\n\
//!       Call-ID: a84b4c76e66710\r\n\
//!       CSeq: 63104 OPTIONS\r\n\
//!       Content-Length: 0\r\n\r\n",
//! )
//! .unwrap();
//! assert_eq!(msg.branch(), Some("z9hG4bKhjhs8ass877"));
//! ```

pub mod error;
pub mod parser;
pub mod types;

pub use error::{Error, ParseError, ParseErrorKind, Result};
pub use parser::{parse_message, MessageAssembler};
pub use types::{
    Address, CSeq, Header, HeaderAccess, HeaderName, HeaderValue, Message, Method, Param, Request, Response,
    StatusCode, Uri, ViaHeader,
};

pub mod prelude {
    pub use crate::error::{Error, ParseError, ParseErrorKind, Result};
    pub use crate::parser::{
        parse_message, HeaderErrorPolicy, HeaderParserRegistry, LenientPolicy, MessageAssembler, StrictPolicy,
    };
    pub use crate::types::{
        Address, CSeq, ContactValue, Header, HeaderAccess, HeaderName, HeaderValue, Host, MediaType, Message,
        Method, Param, ParamList, Request, Response, Scheme, StatusCode, Uri, Version, ViaHeader,
    };
}
