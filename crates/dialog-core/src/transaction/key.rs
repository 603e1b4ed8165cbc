use std::fmt;

use serde::{Deserialize, Serialize};
use sipwire_sip_core::{HeaderAccess, Method, Request, Response};

/// Identifies one transaction: the topmost Via branch, the method and the
/// side of the exchange we are on.
///
/// An ACK for a non-2xx response carries the INVITE's branch, so on the
/// server side it is keyed as `INVITE` and lands on the INVITE server
/// transaction that sent the response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionKey {
    pub branch: String,
    pub method: Method,
    pub is_server: bool,
}

impl TransactionKey {
    pub fn new(branch: impl Into<String>, method: Method, is_server: bool) -> Self {
        Self {
            branch: branch.into(),
            method,
            is_server,
        }
    }

    /// Key of the server transaction an incoming request belongs to.
    pub fn from_request(request: &Request) -> Option<Self> {
        let branch = request.top_via()?.branch()?;
        if branch.is_empty() {
            return None;
        }
        let method = match request.method() {
            Method::Ack => Method::Invite,
            other => other.clone(),
        };
        Some(Self::new(branch, method, true))
    }

    /// Key of the client transaction an outgoing request starts.
    pub fn for_client_request(request: &Request) -> Option<Self> {
        let branch = request.top_via()?.branch()?;
        if branch.is_empty() {
            return None;
        }
        Some(Self::new(branch, request.method().clone(), false))
    }

    /// Key of the client transaction an incoming response belongs to. The
    /// method comes from CSeq since a response has no request line.
    pub fn from_response(response: &Response) -> Option<Self> {
        let branch = response.top_via()?.branch()?;
        if branch.is_empty() {
            return None;
        }
        let cseq = response.cseq()?;
        Some(Self::new(branch, cseq.method.clone(), false))
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn is_server(&self) -> bool {
        self.is_server
    }

    pub fn is_invite(&self) -> bool {
        self.method == Method::Invite
    }
}

impl fmt::Display for TransactionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = if self.is_server { "server" } else { "client" };
        write!(f, "{}:{}:{}", self.branch, self.method, side)
    }
}
