//! Dialog implementation for RFC 3261 SIP dialogs
//!
//! This module contains the main Dialog struct: creation from the request
//! and response that establish it, in-dialog request construction, and the
//! state changes driven by requests and responses within the dialog.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sipwire_sip_core::types::ParamList;
use sipwire_sip_core::{
    Address, CSeq, Header, HeaderAccess, HeaderName, HeaderValue, Method, Request, Response, StatusCode, Uri,
};
use tracing::debug;

use super::dialog_id::DialogId;
use super::dialog_state::DialogState;
use super::dialog_utils::{extract_contact_uri, extract_route_set};
use crate::errors::{DialogError, DialogResult};

/// A SIP dialog as defined in RFC 3261 section 12.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dialog {
    pub id: DialogId,

    pub state: DialogState,

    /// CSeq of the last request we sent in this dialog (0 before any)
    pub local_seq: u32,

    /// Highest CSeq received from the peer; `None` until the first one
    pub remote_seq: Option<u32>,

    /// Our From (UAC) or To (UAS), carrying our tag
    pub local_party: Address,

    /// The peer's address, carrying its tag
    pub remote_party: Address,

    /// Where in-dialog requests are addressed, from the peer's Contact
    pub remote_target: Uri,

    /// Routes for in-dialog requests, in the order they are visited
    pub route_set: Vec<Address>,

    /// Whether we sent the request that created the dialog
    pub is_initiator: bool,
}

impl Dialog {
    /// Create the dialog a UAC gets from a 101-299 response to its
    /// dialog-creating `request`. The response must carry a to-tag.
    pub fn from_uac_response(request: &Request, response: &Response) -> DialogResult<Self> {
        let status = response.status();
        if status == StatusCode::TRYING || !(status.is_provisional() || status.is_success()) {
            return Err(DialogError::protocol_error(format!("{} does not create a dialog", status)));
        }
        let call_id = request.call_id().ok_or_else(|| DialogError::protocol_error("request has no Call-ID"))?;
        let local_tag = request.from_tag().ok_or(DialogError::MissingTag("local"))?;
        let remote_tag = response.to_tag().ok_or(DialogError::MissingTag("remote"))?;
        let cseq = request.cseq().ok_or_else(|| DialogError::protocol_error("request has no CSeq"))?;
        let local_party = request
            .from_address()
            .cloned()
            .ok_or_else(|| DialogError::protocol_error("request has no From"))?;
        let remote_party = response
            .to_address()
            .cloned()
            .ok_or_else(|| DialogError::protocol_error("response has no To"))?;

        let state = if status.is_success() {
            DialogState::Confirmed
        } else {
            DialogState::Early
        };

        let dialog = Self {
            id: DialogId::new(call_id, local_tag, remote_tag),
            state,
            local_seq: cseq.seq,
            remote_seq: None,
            local_party,
            remote_party,
            remote_target: extract_contact_uri(response).unwrap_or_else(|| request.uri.clone()),
            route_set: extract_route_set(response, true),
            is_initiator: true,
        };
        debug!(dialog = %dialog.id, state = %dialog.state, "Created UAC dialog");
        Ok(dialog)
    }

    /// Create the dialog a UAS gets by answering `request` with
    /// `response`, which carries our to-tag.
    pub fn from_uas(request: &Request, response: &Response) -> DialogResult<Self> {
        let status = response.status();
        if status == StatusCode::TRYING || !(status.is_provisional() || status.is_success()) {
            return Err(DialogError::protocol_error(format!("{} does not create a dialog", status)));
        }
        let call_id = request.call_id().ok_or_else(|| DialogError::protocol_error("request has no Call-ID"))?;
        let remote_tag = request.from_tag().ok_or(DialogError::MissingTag("remote"))?;
        let local_tag = response.to_tag().ok_or(DialogError::MissingTag("local"))?;
        let cseq = request.cseq().ok_or_else(|| DialogError::protocol_error("request has no CSeq"))?;
        let local_party = response
            .to_address()
            .cloned()
            .ok_or_else(|| DialogError::protocol_error("response has no To"))?;
        let remote_party = request
            .from_address()
            .cloned()
            .ok_or_else(|| DialogError::protocol_error("request has no From"))?;

        let state = if status.is_success() {
            DialogState::Confirmed
        } else {
            DialogState::Early
        };

        let dialog = Self {
            id: DialogId::new(call_id, local_tag, remote_tag),
            state,
            local_seq: 0,
            remote_seq: Some(cseq.seq),
            local_party,
            remote_target: extract_contact_uri(request).unwrap_or_else(|| remote_party.uri.clone()),
            remote_party,
            route_set: extract_route_set(request, false),
            is_initiator: false,
        };
        debug!(dialog = %dialog.id, state = %dialog.state, "Created UAS dialog");
        Ok(dialog)
    }

    pub fn is_terminated(&self) -> bool {
        self.state.is_terminated()
    }

    pub fn terminate(&mut self) {
        self.state = DialogState::Terminated;
    }

    /// Build the next in-dialog request, taking a fresh local CSeq.
    ///
    /// The request has no Via and no Contact: whoever sends it adds the
    /// ones of the transport it leaves through. ACK does not take a CSeq of
    /// its own, use [`create_ack`](Self::create_ack).
    pub fn create_request(&mut self, method: Method) -> DialogResult<Request> {
        if self.is_terminated() {
            return Err(DialogError::InvalidState {
                id: self.id.clone(),
                state: self.state,
            });
        }
        if method == Method::Ack {
            return Err(DialogError::protocol_error("ACK reuses the INVITE CSeq, use create_ack"));
        }
        self.local_seq = self
            .local_seq
            .checked_add(1)
            .filter(|seq| *seq <= CSeq::MAX_SEQ)
            .ok_or_else(|| DialogError::SequenceExhausted(self.id.clone()))?;
        Ok(self.build_request(method.clone(), CSeq::new(self.local_seq, method)))
    }

    /// ACK for the 2xx answering the INVITE sent with CSeq `invite_seq`.
    pub fn create_ack(&self, invite_seq: u32) -> Request {
        self.build_request(Method::Ack, CSeq::new(invite_seq, Method::Ack))
    }

    fn build_request(&self, method: Method, cseq: CSeq) -> Request {
        let (uri, routes) = self.request_target();

        let mut request = Request::new(method, uri)
            .with_header(Header::new(HeaderName::MaxForwards, HeaderValue::Number(70)))
            .with_header(Header::new(HeaderName::To, HeaderValue::Address(self.remote_party.clone())))
            .with_header(Header::new(HeaderName::From, HeaderValue::Address(self.local_party.clone())))
            .with_header(Header::new(HeaderName::CallId, HeaderValue::CallId(self.id.call_id.clone())))
            .with_header(Header::new(HeaderName::CSeq, HeaderValue::CSeq(cseq)));
        if !routes.is_empty() {
            request.push_header(Header::new(HeaderName::Route, HeaderValue::AddressList(routes)));
        }
        request.with_body(Bytes::new())
    }

    /// Request-URI and Route headers per RFC 3261 section 12.2.1.1. A
    /// first route without `lr` is a strict router: it becomes the
    /// Request-URI and the remote target goes last in the Route list.
    fn request_target(&self) -> (Uri, Vec<Address>) {
        match self.route_set.first() {
            None => (self.remote_target.clone(), Vec::new()),
            Some(first) if first.uri.is_loose_router() => (self.remote_target.clone(), self.route_set.clone()),
            Some(first) => {
                let mut routes: Vec<Address> = self.route_set[1..].to_vec();
                routes.push(Address::new(self.remote_target.clone()));
                (first.uri.clone(), routes)
            }
        }
    }

    /// The next hop for in-dialog requests: the first route, or the remote
    /// target when there is no route set.
    pub fn next_hop(&self) -> &Uri {
        self.route_set.first().map(|route| &route.uri).unwrap_or(&self.remote_target)
    }

    /// Apply an incoming in-dialog request (RFC 3261 section 12.2.2).
    ///
    /// A CSeq lower than the highest one seen is out of order: the request
    /// is rejected and the dialog is left untouched.
    pub fn apply_request(&mut self, request: &Request) -> DialogResult<()> {
        let cseq = request.cseq().ok_or_else(|| DialogError::protocol_error("request has no CSeq"))?;
        if request.method == Method::Ack {
            return Ok(());
        }
        if self.is_terminated() {
            return Err(DialogError::InvalidState {
                id: self.id.clone(),
                state: self.state,
            });
        }
        if let Some(remote_seq) = self.remote_seq {
            if cseq.seq < remote_seq {
                return Err(DialogError::protocol_error(format!(
                    "CSeq {} is lower than {} already seen in dialog {}",
                    cseq.seq, remote_seq, self.id
                )));
            }
        }

        self.remote_seq = Some(cseq.seq);
        if request.method.is_target_refresh() {
            if let Some(target) = extract_contact_uri(request) {
                debug!(dialog = %self.id, target = %target, "Remote target refreshed");
                self.remote_target = target;
            }
        }
        Ok(())
    }

    /// Apply a response to a request of this dialog, sent or received, for
    /// a transaction of `method`. Returns whether the state changed.
    pub fn update_from_response(&mut self, method: &Method, response: &Response) -> bool {
        let before = self.state;
        let status = response.status();

        if self.is_terminated() || status.is_provisional() {
            return false;
        }

        if status.is_success() {
            if self.state == DialogState::Early && method.creates_dialog() {
                self.state = DialogState::Confirmed;
                if self.is_initiator {
                    self.route_set = extract_route_set(response, true);
                }
            }
            if self.is_initiator && method.is_target_refresh() {
                if let Some(target) = extract_contact_uri(response) {
                    self.remote_target = target;
                }
            }
            if *method == Method::Bye {
                self.state = DialogState::Terminated;
            }
        } else if *method == Method::Bye
            || (self.state == DialogState::Early && method.creates_dialog())
            || status == StatusCode::CALL_OR_TRANSACTION_DOES_NOT_EXIST
            || status == StatusCode::REQUEST_TIMEOUT
        {
            self.state = DialogState::Terminated;
        }

        if self.state != before {
            debug!(dialog = %self.id, from = %before, to = %self.state, status = %status, "Dialog state changed");
        }
        self.state != before
    }

    /// Whether `response` belongs to this dialog (same Call-ID and tags).
    pub fn matches_response(&self, response: &Response) -> bool {
        response.call_id() == Some(self.id.call_id.as_str())
            && response.from_tag() == self.local_party.tag()
            && response.to_tag() == Some(self.id.remote_tag.as_str())
    }
}
