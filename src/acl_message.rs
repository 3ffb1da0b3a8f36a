// acl_message.rs
// Core FIPA ACL message structures

use chrono::{DateTime, Datelike, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// A free-form name/value pair attached to an agent identifier or a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserDefinedParameter {
    pub name: String,
    pub value: String,
}

impl UserDefinedParameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = value.into();
    }
}

/// Agent identifier with addressing information
///
/// Resolvers are independent copies, not references: deleting or mutating a
/// resolver never affects any other identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId {
    pub name: String,
    pub addresses: Vec<String>,
    pub resolvers: Vec<AgentId>,
    pub params: Vec<UserDefinedParameter>,
}

impl AgentId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            addresses: Vec::new(),
            resolvers: Vec::new(),
            params: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    pub fn resolvers(&self) -> &[AgentId] {
        &self.resolvers
    }

    pub fn user_defined_parameters(&self) -> &[UserDefinedParameter] {
        &self.params
    }

    pub fn add_address(&mut self, address: impl Into<String>) {
        self.addresses.push(address.into());
    }

    pub fn add_resolver(&mut self, resolver: AgentId) {
        self.resolvers.push(resolver);
    }

    /// Remove every resolver carrying the same name as `resolver`.
    ///
    /// Returns `true` if at least one resolver was removed.
    pub fn delete_resolver(&mut self, resolver: &AgentId) -> bool {
        let before = self.resolvers.len();
        self.resolvers.retain(|r| r.name != resolver.name);
        self.resolvers.len() != before
    }

    pub fn add_user_defined_parameter(&mut self, param: UserDefinedParameter) {
        self.params.push(param);
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.add_address(address);
        self
    }

    pub fn with_resolver(mut self, resolver: AgentId) -> Self {
        self.add_resolver(resolver);
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push(UserDefinedParameter::new(name, value));
        self
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// FIPA performative types
///
/// The 22 communicative acts of FIPA SC00037. Anything else is carried as
/// [`Performative::Unrecognized`] when a decoder is told to tolerate it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Performative {
    AcceptProposal,
    Agree,
    Cancel,
    Cfp,
    Confirm,
    Disconfirm,
    Failure,
    #[default]
    Inform,
    InformIf,
    InformRef,
    NotUnderstood,
    Propagate,
    Propose,
    Proxy,
    QueryIf,
    QueryRef,
    Refuse,
    RejectProposal,
    Request,
    RequestWhen,
    RequestWhenever,
    Subscribe,
    Unrecognized(String),
}

/// Textual performative that is not one of the FIPA communicative acts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown performative: {0}")]
pub struct UnknownPerformative(pub String);

impl Performative {
    /// All standard performatives, ordered by their bit-efficient code.
    pub const STANDARD: [Performative; 22] = [
        Performative::AcceptProposal,
        Performative::Agree,
        Performative::Cancel,
        Performative::Cfp,
        Performative::Confirm,
        Performative::Disconfirm,
        Performative::Failure,
        Performative::Inform,
        Performative::InformIf,
        Performative::InformRef,
        Performative::NotUnderstood,
        Performative::Propagate,
        Performative::Propose,
        Performative::Proxy,
        Performative::QueryIf,
        Performative::QueryRef,
        Performative::Refuse,
        Performative::RejectProposal,
        Performative::Request,
        Performative::RequestWhen,
        Performative::RequestWhenever,
        Performative::Subscribe,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Performative::AcceptProposal => "accept-proposal",
            Performative::Agree => "agree",
            Performative::Cancel => "cancel",
            Performative::Cfp => "cfp",
            Performative::Confirm => "confirm",
            Performative::Disconfirm => "disconfirm",
            Performative::Failure => "failure",
            Performative::Inform => "inform",
            Performative::InformIf => "inform-if",
            Performative::InformRef => "inform-ref",
            Performative::NotUnderstood => "not-understood",
            Performative::Propagate => "propagate",
            Performative::Propose => "propose",
            Performative::Proxy => "proxy",
            Performative::QueryIf => "query-if",
            Performative::QueryRef => "query-ref",
            Performative::Refuse => "refuse",
            Performative::RejectProposal => "reject-proposal",
            Performative::Request => "request",
            Performative::RequestWhen => "request-when",
            Performative::RequestWhenever => "request-whenever",
            Performative::Subscribe => "subscribe",
            Performative::Unrecognized(raw) => raw,
        }
    }

    /// Bit-efficient code (`0x01..=0x16`); `None` for unrecognized acts.
    pub fn code(&self) -> Option<u8> {
        Self::STANDARD
            .iter()
            .position(|p| p == self)
            .map(|idx| idx as u8 + 1)
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1..=22 => Some(Self::STANDARD[code as usize - 1].clone()),
            _ => None,
        }
    }

    /// Parse a textual performative, keeping unknown text as `Unrecognized`.
    pub fn parse_lenient(s: &str) -> Self {
        s.parse()
            .unwrap_or_else(|_| Performative::Unrecognized(s.to_string()))
    }

    pub fn is_unrecognized(&self) -> bool {
        matches!(self, Performative::Unrecognized(_))
    }

    /// `Unrecognized` text naming a standard act becomes that act.
    pub fn canonical(self) -> Self {
        match self {
            Performative::Unrecognized(text) => Self::parse_lenient(&text),
            standard => standard,
        }
    }
}

impl FromStr for Performative {
    type Err = UnknownPerformative;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::STANDARD
            .iter()
            .find(|p| p.as_str() == normalized)
            .cloned()
            .ok_or_else(|| UnknownPerformative(s.to_string()))
    }
}

impl fmt::Display for Performative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timestamp whose year the wire formats cannot carry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("timestamp {0} is outside years 0..=9999")]
pub struct TimestampOutOfRange(pub DateTime<Utc>);

/// Truncate to milliseconds, refusing years outside `0..=9999`.
pub(crate) fn check_timestamp(ts: DateTime<Utc>) -> Result<DateTime<Utc>, TimestampOutOfRange> {
    if (0..=9999).contains(&ts.year()) {
        Ok(ts.trunc_subsecs(3))
    } else {
        Err(TimestampOutOfRange(ts))
    }
}

fn canonical_performative<'de, D: Deserializer<'de>>(d: D) -> Result<Performative, D::Error> {
    Performative::deserialize(d).map(Performative::canonical)
}

fn reply_by_in_range<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
    Option::<DateTime<Utc>>::deserialize(d)?
        .map(check_timestamp)
        .transpose()
        .map_err(serde::de::Error::custom)
}

/// Complete ACL message
///
/// String parameters use the empty string for "not set"; the codecs omit
/// them on the wire and restore them as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclMessage {
    #[serde(deserialize_with = "canonical_performative")]
    performative: Performative,
    sender: Option<AgentId>,
    receivers: Vec<AgentId>,
    reply_to: Vec<AgentId>,
    content: Vec<u8>,
    language: String,
    encoding: String,
    ontology: String,
    protocol: String,
    conversation_id: String,
    reply_with: String,
    in_reply_to: String,
    #[serde(default, deserialize_with = "reply_by_in_range")]
    reply_by: Option<DateTime<Utc>>,
    user_defined_params: Vec<UserDefinedParameter>,
}

impl AclMessage {
    pub fn new(performative: Performative) -> Self {
        Self {
            performative: performative.canonical(),
            ..Default::default()
        }
    }

    pub fn performative(&self) -> &Performative {
        &self.performative
    }

    pub fn sender(&self) -> Option<&AgentId> {
        self.sender.as_ref()
    }

    pub fn receivers(&self) -> &[AgentId] {
        &self.receivers
    }

    pub fn reply_to(&self) -> &[AgentId] {
        &self.reply_to
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Content as text, if it is valid UTF-8.
    pub fn content_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    pub fn ontology(&self) -> &str {
        &self.ontology
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn reply_with(&self) -> &str {
        &self.reply_with
    }

    pub fn in_reply_to(&self) -> &str {
        &self.in_reply_to
    }

    pub fn reply_by(&self) -> Option<DateTime<Utc>> {
        self.reply_by
    }

    pub fn user_defined_parameters(&self) -> &[UserDefinedParameter] {
        &self.user_defined_params
    }

    pub fn set_performative(&mut self, performative: Performative) {
        self.performative = performative.canonical();
    }

    pub fn set_sender(&mut self, sender: AgentId) {
        self.sender = Some(sender);
    }

    pub fn clear_sender(&mut self) {
        self.sender = None;
    }

    pub fn add_receiver(&mut self, receiver: AgentId) {
        self.receivers.push(receiver);
    }

    pub fn set_receivers(&mut self, receivers: Vec<AgentId>) {
        self.receivers = receivers;
    }

    pub fn add_reply_to(&mut self, agent: AgentId) {
        self.reply_to.push(agent);
    }

    pub fn set_content(&mut self, content: impl Into<Vec<u8>>) {
        self.content = content.into();
    }

    pub fn set_language(&mut self, language: impl Into<String>) {
        self.language = language.into();
    }

    pub fn set_encoding(&mut self, encoding: impl Into<String>) {
        self.encoding = encoding.into();
    }

    pub fn set_ontology(&mut self, ontology: impl Into<String>) {
        self.ontology = ontology.into();
    }

    pub fn set_protocol(&mut self, protocol: impl Into<String>) {
        self.protocol = protocol.into();
    }

    pub fn set_conversation_id(&mut self, conversation_id: impl Into<String>) {
        self.conversation_id = conversation_id.into();
    }

    pub fn set_reply_with(&mut self, reply_with: impl Into<String>) {
        self.reply_with = reply_with.into();
    }

    pub fn set_in_reply_to(&mut self, in_reply_to: impl Into<String>) {
        self.in_reply_to = in_reply_to.into();
    }

    /// Set the reply deadline, truncated to whole milliseconds.
    ///
    /// Both wire formats carry a four digit year, so deadlines outside
    /// years `0..=9999` are refused and the previous value is kept.
    pub fn set_reply_by(&mut self, reply_by: DateTime<Utc>) -> Result<(), TimestampOutOfRange> {
        self.reply_by = Some(check_timestamp(reply_by)?);
        Ok(())
    }

    pub fn clear_reply_by(&mut self) {
        self.reply_by = None;
    }

    pub fn add_user_defined_parameter(&mut self, param: UserDefinedParameter) {
        self.user_defined_params.push(param);
    }

    pub fn with_sender(mut self, sender: AgentId) -> Self {
        self.set_sender(sender);
        self
    }

    pub fn with_receiver(mut self, receiver: AgentId) -> Self {
        self.add_receiver(receiver);
        self
    }

    pub fn with_content(mut self, content: impl Into<Vec<u8>>) -> Self {
        self.set_content(content);
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.set_language(language);
        self
    }

    pub fn with_ontology(mut self, ontology: impl Into<String>) -> Self {
        self.set_ontology(ontology);
        self
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.set_protocol(protocol);
        self
    }

    pub fn with_conversation_id(mut self, conversation_id: impl Into<String>) -> Self {
        self.set_conversation_id(conversation_id);
        self
    }

    pub fn with_reply_with(mut self, reply_with: impl Into<String>) -> Self {
        self.set_reply_with(reply_with);
        self
    }

    pub fn with_in_reply_to(mut self, in_reply_to: impl Into<String>) -> Self {
        self.set_in_reply_to(in_reply_to);
        self
    }

    pub fn with_reply_by(mut self, reply_by: DateTime<Utc>) -> Result<Self, TimestampOutOfRange> {
        self.set_reply_by(reply_by)?;
        Ok(self)
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_user_defined_parameter(UserDefinedParameter::new(name, value));
        self
    }

    /// Build a reply addressed to this message's sender, in the same conversation.
    pub fn create_reply(&self, performative: Performative) -> AclMessage {
        let mut reply = AclMessage::new(performative);
        reply.sender = self.receivers.first().cloned();
        reply.receivers = if self.reply_to.is_empty() {
            self.sender.clone().into_iter().collect()
        } else {
            self.reply_to.clone()
        };
        reply.language = self.language.clone();
        reply.encoding = self.encoding.clone();
        reply.ontology = self.ontology.clone();
        reply.protocol = self.protocol.clone();
        reply.conversation_id = self.conversation_id.clone();
        reply.in_reply_to = self.reply_with.clone();
        reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_defined_parameter() {
        let mut param = UserDefinedParameter::default();
        param.set_name("param_0");
        param.set_value("value_0");

        assert_eq!(param.name(), "param_0");
        assert_eq!(param.value(), "value_0");
    }

    #[test]
    fn test_agent_id_resolvers() {
        let resolver = AgentId::new("resolver_0");
        let mut id = AgentId::new("agent_0");
        id.add_address("address_0");
        id.add_resolver(resolver.clone());

        assert_eq!(id.name(), "agent_0");
        assert_eq!(id.addresses(), ["address_0".to_string()]);
        assert_eq!(id.resolvers().len(), 1);
        assert_eq!(id.resolvers()[0].name(), resolver.name());

        assert!(id.delete_resolver(&resolver));
        assert!(id.resolvers().is_empty());
        assert!(!id.delete_resolver(&resolver));

        id.add_user_defined_parameter(UserDefinedParameter::new("param_0", ""));
        assert_eq!(id.user_defined_parameters().len(), 1);
        assert_eq!(id.user_defined_parameters()[0].name(), "param_0");
    }

    #[test]
    fn test_performative_codes() {
        assert_eq!(Performative::AcceptProposal.code(), Some(0x01));
        assert_eq!(Performative::Inform.code(), Some(0x08));
        assert_eq!(Performative::Request.code(), Some(0x13));
        assert_eq!(Performative::Subscribe.code(), Some(0x16));
        assert_eq!(Performative::from_code(0x15), Some(Performative::RequestWhenever));
        assert_eq!(Performative::from_code(0x00), None);
        assert_eq!(Performative::from_code(0x17), None);
        assert_eq!(Performative::Unrecognized("x".into()).code(), None);
    }

    #[test]
    fn test_performative_parsing() {
        assert_eq!("inform".parse::<Performative>(), Ok(Performative::Inform));
        assert_eq!(
            "Request_Whenever".parse::<Performative>(),
            Ok(Performative::RequestWhenever)
        );
        assert!("inform-done".parse::<Performative>().is_err());
        assert_eq!(
            Performative::parse_lenient("inform-done"),
            Performative::Unrecognized("inform-done".into())
        );
    }

    #[test]
    fn test_message_creation() {
        let msg = AclMessage::new(Performative::Request)
            .with_sender(AgentId::new("agent1"))
            .with_receiver(AgentId::new("agent2"))
            .with_content("perform action X")
            .with_protocol("fipa-request");

        assert_eq!(msg.performative(), &Performative::Request);
        assert_eq!(msg.content_str(), Some("perform action X"));
        assert_eq!(msg.receivers().len(), 1);
        assert!(msg.conversation_id().is_empty());
    }

    #[test]
    fn test_reply_by_truncates_to_millis() {
        let ts = DateTime::parse_from_rfc3339("2010-12-23T12:00:37.123456789Z")
            .unwrap()
            .with_timezone(&Utc);
        let msg = AclMessage::default().with_reply_by(ts).unwrap();
        assert_eq!(msg.reply_by().unwrap().timestamp_subsec_nanos(), 123_000_000);
    }

    #[test]
    fn test_reply_by_year_range() {
        use chrono::TimeZone;

        let mut msg = AclMessage::default();
        let first = Utc.with_ymd_and_hms(0, 1, 1, 0, 0, 0).unwrap();
        let last = Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).unwrap();
        msg.set_reply_by(first).unwrap();
        msg.set_reply_by(last).unwrap();

        for year in [-1, 10_000] {
            let ts = Utc.with_ymd_and_hms(year, 6, 1, 0, 0, 0).unwrap();
            assert_eq!(msg.set_reply_by(ts), Err(TimestampOutOfRange(ts)));
        }
        assert_eq!(msg.reply_by(), Some(last));

        let json = serde_json::to_string(&msg).unwrap().replace("9999-12-31", "10000-12-31");
        assert!(serde_json::from_str::<AclMessage>(&json).is_err());
    }

    #[test]
    fn test_standard_text_performative_canonical() {
        let msg = AclMessage::new(Performative::Unrecognized("inform".into()));
        assert_eq!(msg.performative(), &Performative::Inform);

        let mut msg = AclMessage::default();
        msg.set_performative(Performative::Unrecognized("Query_If".into()));
        assert_eq!(msg.performative(), &Performative::QueryIf);
        msg.set_performative(Performative::Unrecognized("gossip".into()));
        assert!(msg.performative().is_unrecognized());

        let json = r#"{"performative":{"Unrecognized":"agree"},"sender":null,"receivers":[],
            "reply_to":[],"content":[],"language":"","encoding":"","ontology":"","protocol":"",
            "conversation_id":"","reply_with":"","in_reply_to":"","user_defined_params":[]}"#;
        let msg: AclMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.performative(), &Performative::Agree);
    }

    #[test]
    fn test_create_reply() {
        let request = AclMessage::new(Performative::Request)
            .with_sender(AgentId::new("initiator"))
            .with_receiver(AgentId::new("participant"))
            .with_protocol("fipa-request")
            .with_conversation_id("conv-1")
            .with_reply_with("req-1");

        let reply = request.create_reply(Performative::Agree);
        assert_eq!(reply.sender().map(AgentId::name), Some("participant"));
        assert_eq!(reply.receivers()[0].name(), "initiator");
        assert_eq!(reply.conversation_id(), "conv-1");
        assert_eq!(reply.in_reply_to(), "req-1");
    }
}
