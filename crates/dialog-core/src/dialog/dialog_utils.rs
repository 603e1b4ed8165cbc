//! Helpers for building and refreshing dialogs.

use std::net::SocketAddr;

use sipwire_sip_core::types::{Host, Scheme};
use sipwire_sip_core::{Address, HeaderAccess, Uri};

/// URI of the first Contact, the peer's target for new requests.
pub fn extract_contact_uri<M: HeaderAccess>(message: &M) -> Option<Uri> {
    message.contacts().first().map(|contact| contact.uri.clone())
}

/// Route set from the Record-Route headers of `message`. The UAC reverses
/// them, the UAS keeps them in order (RFC 3261 section 12.1).
pub fn extract_route_set<M: HeaderAccess>(message: &M, reverse: bool) -> Vec<Address> {
    let mut routes: Vec<Address> = message.record_route().into_iter().cloned().collect();
    if reverse {
        routes.reverse();
    }
    routes
}

/// Contact for requests and responses leaving through `local_addr`.
pub fn local_contact(local_addr: SocketAddr) -> Address {
    Address::new(Uri::new(Scheme::Sip, Host::Address(local_addr.ip())).with_port(local_addr.port()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sipwire_sip_core::{parse_message, Message};

    fn response() -> Message {
        parse_message(
            b"SIP/2.0 200 OK\r\n\
              Via: SIP/2.0/UDP 192.0.2.1;branch=z9hG4bKnashds8\r\n\
              Record-Route: <sip:p2.example.com;lr>, <sip:p1.example.com;lr>\r\n\
              From: <sip:alice@atlanta.com>;tag=1928301774\r\n\
              To: <sip:bob@biloxi.com>;tag=a6c85cf\r\n\
              Call-ID: a84b4c76e66710\r\n\
              Contact: <sip:bob@192.0.2.4>\r\n\
              CSeq: 1 INVITE\r\n\
              Content-Length: 0\r\n\r\n",
        )
        .unwrap()
    }

    #[test]
    fn uac_route_set_is_reversed() {
        let msg = response();
        let uac = extract_route_set(&msg, true);
        let uas = extract_route_set(&msg, false);
        assert_eq!(uac[0].uri.host, Host::domain("p1.example.com"));
        assert_eq!(uas[0].uri.host, Host::domain("p2.example.com"));
        assert!(uac.iter().all(|route| route.uri.is_loose_router()));
    }

    #[test]
    fn contact_becomes_target() {
        let target = extract_contact_uri(&response()).unwrap();
        assert_eq!(target.to_string(), "sip:bob@192.0.2.4");
        let contact = local_contact("192.0.2.1:5070".parse().unwrap());
        assert_eq!(contact.uri.to_string(), "sip:192.0.2.1:5070");
    }
}
