// Codec integration tests: fixture decoding and cross-representation round trips

use chrono::{DateTime, TimeZone, Utc};
use fipa_acl::codec::{self, DecodeErrorKind, DecodeOptions, Representation};
use fipa_acl::{AclMessage, AgentId, Performative};
use proptest::prelude::*;

const INFORM_FIXTURE: &[u8] = include_bytes!("fixtures/inform.acl");

#[test]
fn test_fixture_lenient_decode() {
    let msg = codec::decode(INFORM_FIXTURE, false).unwrap();

    assert_eq!(msg.performative(), &Performative::Inform);
    let sender = msg.sender().unwrap();
    assert_eq!(sender.name(), "weather-station");
    assert_eq!(sender.addresses(), ["http://station.example:7778/acc"]);

    assert_eq!(msg.receivers().len(), 1);
    let planner = &msg.receivers()[0];
    assert_eq!(planner.name(), "planner");
    assert_eq!(planner.resolvers()[0].name(), "df@platform");

    assert_eq!(msg.content_str(), Some("((temperature berlin 21.5))"));
    assert_eq!(msg.language(), "fipa-sl");
    assert_eq!(msg.ontology(), "weather");
    assert_eq!(msg.protocol(), "fipa-request");
    assert_eq!(msg.conversation_id(), "forecast-42");
    assert_eq!(msg.in_reply_to(), "req-7");
    assert_eq!(
        msg.reply_by(),
        Some(Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap())
    );

    let params = msg.user_defined_parameters();
    assert_eq!(params.len(), 1);
    assert_eq!(params[0].name(), "priority");
    assert_eq!(params[0].value(), "high");
}

#[test]
fn test_fixture_strict_rejects_unknown_parameter() {
    let err = codec::decode(INFORM_FIXTURE, true).unwrap_err();
    assert_eq!(err.kind, DecodeErrorKind::MalformedStructure);
}

#[test]
fn test_fixture_converts_to_bitefficient() {
    let msg = codec::decode(INFORM_FIXTURE, false).unwrap();
    let binary = codec::encode(&msg, Representation::Bitefficient);

    assert_eq!(Representation::detect(&binary), Some(Representation::Bitefficient));
    assert_eq!(codec::decode(&binary, true).unwrap(), msg);
}

#[test]
fn test_unrecognized_performative_option() {
    let input = b"(gossip :content \"x\")";
    let err = codec::decode(input, true).unwrap_err();
    assert_eq!(err.kind, DecodeErrorKind::UnknownPerformative);

    let options = DecodeOptions::strict().with_unrecognized_performatives();
    let msg = codec::decode_with(input, options).unwrap();
    assert_eq!(msg.performative(), &Performative::Unrecognized("gossip".into()));
}

#[test]
fn test_standard_act_as_text_roundtrips() {
    let msg = AclMessage::new(Performative::Unrecognized("inform".into())).with_content("x");
    for representation in [Representation::Bitefficient, Representation::String] {
        let bytes = codec::encode(&msg, representation);
        assert_eq!(codec::decode(&bytes, true).unwrap(), msg);
    }
}

#[test]
fn test_undetectable_input() {
    assert_eq!(
        codec::decode(b"   ", true).unwrap_err().kind,
        DecodeErrorKind::TruncatedInput
    );
    assert_eq!(
        codec::decode(b"inform", true).unwrap_err().kind,
        DecodeErrorKind::MalformedStructure
    );
}

fn text() -> impl Strategy<Value = String> {
    "[ -~]{0,12}"
}

/// User-defined parameter names: any printable text, including spaces,
/// parentheses, quotes and keyword-like fragments.
fn param_name() -> impl Strategy<Value = String> {
    prop_oneof![
        "\\PC{0,10}",
        "[ -~]{0,10}",
        Just("p x :conversation-id hijacked".to_string()),
    ]
}

fn agent(depth: u32) -> BoxedStrategy<AgentId> {
    let base = (
        "[a-z][a-z0-9@.-]{0,10}",
        prop::collection::vec("[a-z]{2,5}://[a-z]{1,8}:[0-9]{2,4}", 0..3),
        prop::collection::vec((param_name(), text()), 0..2),
    );
    let resolvers = if depth == 0 {
        Just(Vec::new()).boxed()
    } else {
        prop::collection::vec(agent(depth - 1), 0..2).boxed()
    };

    (base, resolvers)
        .prop_map(|((name, addresses, params), resolvers)| {
            let mut agent = AgentId::new(name);
            for address in addresses {
                agent.add_address(address);
            }
            for resolver in resolvers {
                agent.add_resolver(resolver);
            }
            for (key, value) in params {
                agent = agent.with_param(key, value);
            }
            agent
        })
        .boxed()
}

const YEAR_0_START: i64 = -62_167_219_200;
const YEAR_9999_END: i64 = 253_402_300_799;

/// Timestamps across the representable years, weighted towards both ends.
fn timestamp() -> impl Strategy<Value = DateTime<Utc>> {
    let secs = prop_oneof![
        0i64..4_102_444_800,
        YEAR_0_START..YEAR_0_START + 86_400 * 366,
        YEAR_9999_END - 86_400 * 366..=YEAR_9999_END,
    ];
    (secs, 0u32..1000).prop_map(|(secs, millis)| {
        Utc.timestamp_opt(secs, millis * 1_000_000)
            .single()
            .unwrap_or_default()
    })
}

prop_compose! {
    fn message()(
        performative in prop::sample::select(Performative::STANDARD.to_vec()),
        sender in prop::option::of(agent(2)),
        receivers in prop::collection::vec(agent(1), 0..3),
        content in prop::collection::vec(any::<u8>(), 0..64),
        fields in prop::collection::vec(text(), 7),
        reply_by in prop::option::of(timestamp()),
        params in prop::collection::vec((param_name(), text()), 0..3),
    ) -> AclMessage {
        let mut msg = AclMessage::new(performative)
            .with_content(content)
            .with_language(fields[0].clone())
            .with_ontology(fields[1].clone())
            .with_protocol(fields[2].clone())
            .with_conversation_id(fields[3].clone())
            .with_reply_with(fields[4].clone())
            .with_in_reply_to(fields[5].clone());
        msg.set_encoding(fields[6].clone());
        if let Some(sender) = sender {
            msg.set_sender(sender);
        }
        msg.set_receivers(receivers);
        if let Some(reply_by) = reply_by {
            msg.set_reply_by(reply_by).unwrap();
        }
        for (name, value) in params {
            msg = msg.with_param(name, value);
        }
        msg
    }
}

#[test]
fn test_reply_by_year_edges_roundtrip() {
    for secs in [YEAR_0_START, YEAR_9999_END] {
        let reply_by = Utc.timestamp_opt(secs, 999_000_000).single().unwrap();
        let msg = AclMessage::new(Performative::Inform)
            .with_reply_by(reply_by)
            .unwrap();
        for representation in [Representation::Bitefficient, Representation::String] {
            let bytes = codec::encode(&msg, representation);
            assert_eq!(codec::decode(&bytes, true).unwrap().reply_by(), Some(reply_by));
        }
    }

    let beyond = Utc.timestamp_opt(YEAR_9999_END + 1, 0).single().unwrap();
    assert!(AclMessage::default().with_reply_by(beyond).is_err());
}

proptest! {
    #[test]
    fn prop_roundtrip_both_representations(msg in message()) {
        for representation in [Representation::Bitefficient, Representation::String] {
            let bytes = codec::encode(&msg, representation);
            prop_assert_eq!(Representation::detect(&bytes), Some(representation));
            let decoded = codec::decode(&bytes, true).unwrap();
            prop_assert_eq!(&decoded, &msg);
        }
    }
}
