pub mod address;
pub mod cseq;
pub mod event;
pub mod header;
pub mod media_type;
pub mod message;
pub mod method;
pub mod param;
pub mod status;
pub mod uri;
pub mod version;
pub mod via;

pub use address::Address;
pub use cseq::CSeq;
pub use event::EventType;
pub use header::{ContactValue, Header, HeaderName, HeaderValue};
pub use media_type::MediaType;
pub use message::{HeaderAccess, Message, Request, Response};
pub use method::Method;
pub use param::{GenericValue, Param, ParamList};
pub use status::StatusCode;
pub use uri::{Host, Scheme, Uri};
pub use version::Version;
pub use via::{ViaHeader, BRANCH_MAGIC_COOKIE};
