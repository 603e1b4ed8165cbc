//! Property tests: every header grammar reads back what the typed value
//! writes out.

use proptest::prelude::*;
use sipwire_sip_core::parser::standard_registry;
use sipwire_sip_core::prelude::*;
use sipwire_sip_core::types::{EventType, GenericValue};

fn reparse(header: &Header) -> Header {
    let line = header.to_string();
    standard_registry()
        .parse_header_line(&line)
        .unwrap_or_else(|e| panic!("failed to reparse {:?}: {}", line, e))
}

fn uri_strategy() -> impl Strategy<Value = Uri> {
    (
        any::<bool>(),
        proptest::option::of("[a-z0-9]{1,8}"),
        "[a-z][a-z0-9\\-]{0,8}(\\.[a-z]{2,4})?",
        proptest::option::of(1024u16..65535),
        any::<bool>(),
    )
        .prop_map(|(secure, user, host, port, lr)| {
            let mut uri = if secure { Uri::sips(host) } else { Uri::sip(host) };
            uri.user = user;
            uri.port = port;
            if lr {
                uri = uri.with_param(Param::Lr);
            }
            uri
        })
}

fn address_strategy() -> impl Strategy<Value = Address> {
    (
        proptest::option::of("[A-Za-z]{1,6}( [A-Za-z]{1,6})?"),
        proptest::option::of("[A-Za-z0-9 ,]{1,10}"),
        uri_strategy(),
        proptest::option::of("[a-z0-9]{4,12}"),
    )
        .prop_map(|(token_name, quoted_name, uri, tag)| {
            let mut addr = Address::new(uri);
            if let Some(name) = quoted_name.or(token_name) {
                addr = addr.with_display_name(name);
            }
            if let Some(tag) = tag {
                addr = addr.with_tag(tag);
            }
            addr
        })
}

fn via_strategy() -> impl Strategy<Value = ViaHeader> {
    (
        prop::sample::select(vec!["UDP", "TCP", "TLS"]),
        "[a-z]{1,8}\\.example\\.com",
        proptest::option::of(1024u16..65535),
        "[a-zA-Z0-9]{4,16}",
        any::<bool>(),
    )
        .prop_map(|(transport, host, port, branch, rport)| {
            let mut via = ViaHeader::new(transport, Host::domain(host), port, format!("z9hG4bK{}", branch));
            if rport {
                via.set_param(Param::Rport(None));
            }
            via
        })
}

proptest! {
    #[test]
    fn address_headers_round_trip(addr in address_strategy(), which in 0usize..3) {
        let name = [HeaderName::From, HeaderName::To, HeaderName::ReferTo][which].clone();
        let header = Header::new(name, HeaderValue::Address(addr));
        prop_assert_eq!(reparse(&header), header);
    }

    #[test]
    fn route_lists_round_trip(route in prop::collection::vec(address_strategy(), 1..4)) {
        let header = Header::new(HeaderName::RecordRoute, HeaderValue::AddressList(route));
        prop_assert_eq!(reparse(&header), header);
    }

    #[test]
    fn contact_lists_round_trip(contacts in prop::collection::vec(address_strategy(), 1..4)) {
        let header = Header::new(HeaderName::Contact, HeaderValue::Contact(ContactValue::Addresses(contacts)));
        prop_assert_eq!(reparse(&header), header);
    }

    #[test]
    fn via_lists_round_trip(vias in prop::collection::vec(via_strategy(), 1..4)) {
        let header = Header::new(HeaderName::Via, HeaderValue::Via(vias));
        prop_assert_eq!(reparse(&header), header);
    }

    #[test]
    fn cseq_round_trips(seq in 0u32..0x7fff_ffff, method in "[A-Z]{3,10}") {
        let method: Method = method.parse().unwrap();
        let header = Header::new(HeaderName::CSeq, HeaderValue::CSeq(CSeq::new(seq, method)));
        prop_assert_eq!(reparse(&header), header);
    }

    #[test]
    fn parameterised_values_round_trip(
        package in "[a-z]{2,10}(\\.[a-z]{2,6})?",
        id in "[a-z0-9]{1,6}",
        boundary in "[A-Za-z0-9 ]{1,12}",
    ) {
        let mut event = EventType::new(package);
        event.params.push(Param::Other("id".into(), Some(GenericValue::Token(id))));
        let header = Header::new(HeaderName::Event, HeaderValue::Event(event));
        prop_assert_eq!(reparse(&header), header);

        let mut media = MediaType::new("multipart", "mixed");
        media.params.push(Param::Other("boundary".into(), Some(GenericValue::Quoted(boundary))));
        let header = Header::new(HeaderName::ContentType, HeaderValue::ContentType(media));
        prop_assert_eq!(reparse(&header), header);
    }

    #[test]
    fn token_lists_round_trip(tokens in prop::collection::vec("[a-z0-9]{1,8}", 0..5)) {
        let header = Header::new(HeaderName::Supported, HeaderValue::Tokens(tokens));
        prop_assert_eq!(reparse(&header), header);
    }
}
