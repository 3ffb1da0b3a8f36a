// Conversation monitor integration tests

use fipa_acl::config::MonitorSettings;
use fipa_acl::protocol::CachedGrammar;
use fipa_acl::{
    AclEnvelope, AclMessage, AgentId, ConversationError, ConversationMonitor, ConversationStatus,
    DecodeOptions, DirectoryGrammar, GrammarLibrary, Performative, Representation, codec,
};
use std::fs;
use std::sync::Arc;

const PING_GRAMMAR: &str = r#"{
  "name": "ping",
  "initial": "idle",
  "states": [
    { "name": "idle", "transitions": [ { "performative": "query-if", "target": "pinged" } ] },
    { "name": "pinged", "transitions": [ { "performative": "confirm", "target": "ponged" } ] },
    { "name": "ponged", "final": true }
  ]
}"#;

fn message(performative: Performative, conversation: &str) -> AclMessage {
    AclMessage::new(performative)
        .with_sender(AgentId::new("proxy"))
        .with_receiver(AgentId::new("peer"))
        .with_conversation_id(conversation)
}

fn monitor_with_dir(dir: &std::path::Path) -> ConversationMonitor {
    let grammar = CachedGrammar::new(DirectoryGrammar::with_fallback(
        GrammarLibrary::fipa_standard(),
    ));
    ConversationMonitor::with_settings(
        AgentId::new("proxy"),
        Arc::new(grammar),
        MonitorSettings {
            protocol_resource_dir: Some(dir.to_path_buf()),
            default_content_language: String::new(),
        },
    )
}

#[test]
fn test_request_protocol_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let monitor = monitor_with_dir(dir.path());

    let request = message(Performative::Request, "req-1")
        .with_protocol("fipa-request")
        .with_language("fipa-sl");
    let conversation = monitor.update_conversation(&request).unwrap();
    assert_eq!(conversation.status(), ConversationStatus::InProgress);
    assert_eq!(conversation.content_language(), "fipa-sl");

    let agree = request.create_reply(Performative::Agree);
    let inform = request.create_reply(Performative::Inform);
    monitor.update_conversation(&agree).unwrap();
    assert!(!conversation.has_ended());
    monitor.update_conversation(&inform).unwrap();

    assert!(conversation.has_ended());
    assert_eq!(conversation.status(), ConversationStatus::Ended);
    assert_eq!(conversation.message_count(), 3);
    assert_eq!(
        conversation.last_message().unwrap().performative(),
        &Performative::Inform
    );
}

#[test]
fn test_grammar_file_from_resource_dir() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("ping.json"), PING_GRAMMAR).unwrap();
    let monitor = monitor_with_dir(dir.path());

    let ping = message(Performative::QueryIf, "ping-1").with_protocol("ping");
    let conversation = monitor.update_conversation(&ping).unwrap();
    assert_eq!(conversation.expected_performatives(), vec![Performative::Confirm]);

    let err = monitor
        .update_conversation(&message(Performative::Inform, "ping-1"))
        .unwrap_err();
    match err {
        ConversationError::IllegalProtocolTransition {
            protocol,
            performative,
            expected,
        } => {
            assert_eq!(protocol, "ping");
            assert_eq!(performative, Performative::Inform);
            assert_eq!(expected, vec![Performative::Confirm]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(conversation.message_count(), 1);

    monitor
        .update_conversation(&message(Performative::Confirm, "ping-1"))
        .unwrap();
    assert!(conversation.has_ended());
}

#[test]
fn test_unknown_protocol_is_permissive() {
    let dir = tempfile::tempdir().unwrap();
    let monitor = monitor_with_dir(dir.path());

    let first = message(Performative::Propose, "free-1").with_protocol("haggle");
    let conversation = monitor.update_conversation(&first).unwrap();
    for performative in [Performative::Cancel, Performative::Inform, Performative::Propose] {
        monitor
            .update_conversation(&message(performative, "free-1"))
            .unwrap();
    }

    assert_eq!(conversation.message_count(), 4);
    assert!(!conversation.has_ended());
}

#[test]
fn test_mismatched_conversation_rejected() {
    let monitor = ConversationMonitor::new(AgentId::new("proxy"));
    let conversation = monitor.get_or_create_conversation("a");

    let err = conversation
        .update(&message(Performative::Inform, "b"))
        .unwrap_err();
    assert_eq!(
        err,
        ConversationError::ConversationMismatch {
            expected: "a".into(),
            found: "b".into(),
        }
    );
    assert_eq!(conversation.status(), ConversationStatus::NoMessages);
    assert_eq!(conversation.last_message(), Err(ConversationError::EmptyHistory));
}

#[test]
fn test_decoded_messages_feed_monitor() {
    let monitor = ConversationMonitor::new(AgentId::new("proxy"));
    let outgoing = message(Performative::Inform, "wire-1").with_content("(done)");

    for representation in [Representation::Bitefficient, Representation::String] {
        let bytes = codec::encode(&outgoing, representation);
        let incoming = codec::decode(&bytes, true).unwrap();
        monitor.update_conversation(&incoming).unwrap();
    }

    let conversation = monitor.get_conversation("wire-1").unwrap();
    assert_eq!(conversation.messages(), vec![outgoing.clone(), outgoing]);
}

#[test]
fn test_concurrent_conversations() {
    let monitor = ConversationMonitor::new(AgentId::new("proxy"));

    std::thread::scope(|s| {
        for worker in 0..4 {
            let monitor = &monitor;
            s.spawn(move || {
                for n in 0..10 {
                    let id = format!("conv-{}", n % 5);
                    monitor
                        .update_conversation(&message(Performative::Inform, &id))
                        .unwrap();
                    if worker == 0 && n == 9 {
                        monitor.start_conversation("side topic");
                    }
                }
            });
        }
    });

    assert_eq!(monitor.len(), 6);
    let total: usize = (0..5)
        .map(|n| {
            monitor
                .get_conversation(&format!("conv-{}", n))
                .unwrap()
                .message_count()
        })
        .sum();
    assert_eq!(total, 40);

    monitor.cleanup();
    assert!(monitor.is_empty());
}

#[test]
fn test_roles_follow_first_request() {
    let dir = tempfile::tempdir().unwrap();
    let monitor = monitor_with_dir(dir.path());

    let request = message(Performative::Request, "roles-1").with_protocol("fipa-request");
    let conversation = monitor.update_conversation(&request).unwrap();
    assert_eq!(conversation.role_agents("initiator"), Some(vec!["proxy".to_string()]));
    assert_eq!(conversation.role_agents("participant"), Some(vec!["peer".to_string()]));

    let mut forged = request.create_reply(Performative::Agree);
    forged.set_sender(AgentId::new("intruder"));
    let err = monitor.update_conversation(&forged).unwrap_err();
    assert_eq!(
        err,
        ConversationError::RoleViolation {
            protocol: "fipa-request".into(),
            role: "participant".into(),
            agent: "intruder".into(),
        }
    );

    monitor
        .update_conversation(&request.create_reply(Performative::Refuse))
        .unwrap();
    assert!(conversation.has_ended());
}

#[test]
fn test_late_protocol_replays_recorded_messages() {
    let dir = tempfile::tempdir().unwrap();
    let monitor = monitor_with_dir(dir.path());

    let request = message(Performative::Request, "late-1");
    let conversation = monitor.update_conversation(&request).unwrap();
    monitor
        .update_conversation(&request.create_reply(Performative::Agree))
        .unwrap();
    assert!(!conversation.is_validating());

    conversation.set_protocol("fipa-request");
    assert!(conversation.is_validating());
    assert!(!conversation.has_ended());
    assert!(
        !conversation
            .expected_performatives()
            .contains(&Performative::Agree)
    );

    monitor
        .update_conversation(&request.create_reply(Performative::Inform))
        .unwrap();
    assert!(conversation.has_ended());
}

#[test]
fn test_enveloped_message_feeds_monitor() {
    let monitor = ConversationMonitor::new(AgentId::new("peer"));
    let outgoing = message(Performative::Inform, "env-1").with_content("(done)");

    let mut envelope = AclEnvelope::for_message(&outgoing, Representation::Bitefficient);
    envelope.stamp(&AgentId::new("mts-a"));
    envelope.stamp(&AgentId::new("mts-b"));

    let received = codec::decode_envelope(&codec::encode_envelope(&envelope)).unwrap();
    assert!(received.has_stamp(&AgentId::new("mts-a")));
    assert_eq!(received.flattened().to(), [AgentId::new("peer")]);

    let incoming = received.message(DecodeOptions::strict()).unwrap();
    monitor.update_conversation(&incoming).unwrap();
    assert_eq!(
        monitor.get_conversation("env-1").unwrap().messages(),
        vec![outgoing]
    );
}
