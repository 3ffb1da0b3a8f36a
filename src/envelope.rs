// envelope.rs - FIPA ACL Message Envelope
//
//! Transport envelope around an encoded ACL message (FIPA SC00085)
//!
//! An [`AclEnvelope`] carries a base envelope, one extra envelope per
//! message transport service that handled it, and the encoded message as
//! payload. Extra envelopes override earlier ones field by field;
//! [`AclEnvelope::flattened`] gives the combined view.

use crate::acl_message::{
    AclMessage, AgentId, TimestampOutOfRange, UserDefinedParameter, check_timestamp,
};
use crate::codec::{self, DecodeError, DecodeOptions, Representation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stamp left by a message transport service that received the envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedObject {
    by: String,
    date: DateTime<Utc>,
    from: String,
    id: String,
    via: String,
}

impl ReceivedObject {
    /// `by` is the receiving transport service; `date` is truncated to
    /// milliseconds.
    pub fn new(by: impl Into<String>, date: DateTime<Utc>) -> Result<Self, TimestampOutOfRange> {
        Ok(Self {
            by: by.into(),
            date: check_timestamp(date)?,
            from: String::new(),
            id: String::new(),
            via: String::new(),
        })
    }

    pub fn by(&self) -> &str {
        &self.by
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    pub fn from(&self) -> &str {
        &self.from
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn via(&self) -> &str {
        &self.via
    }

    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = from.into();
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_via(mut self, via: impl Into<String>) -> Self {
        self.via = via.into();
        self
    }
}

/// One layer of envelope fields. Every field may be absent; absent fields
/// are filled from other layers by [`BaseEnvelope::merge`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseEnvelope {
    to: Vec<AgentId>,
    from: Option<AgentId>,
    comments: Option<String>,
    acl_representation: Option<Representation>,
    payload_length: Option<u64>,
    payload_encoding: Option<String>,
    date: Option<DateTime<Utc>>,
    intended_receivers: Vec<AgentId>,
    received: Option<ReceivedObject>,
    transport_behaviour: Option<String>,
    user_defined_params: Vec<UserDefinedParameter>,
}

impl BaseEnvelope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to(&self) -> &[AgentId] {
        &self.to
    }

    pub fn from(&self) -> Option<&AgentId> {
        self.from.as_ref()
    }

    pub fn comments(&self) -> Option<&str> {
        self.comments.as_deref()
    }

    pub fn acl_representation(&self) -> Option<Representation> {
        self.acl_representation
    }

    pub fn payload_length(&self) -> Option<u64> {
        self.payload_length
    }

    pub fn payload_encoding(&self) -> Option<&str> {
        self.payload_encoding.as_deref()
    }

    pub fn date(&self) -> Option<DateTime<Utc>> {
        self.date
    }

    pub fn intended_receivers(&self) -> &[AgentId] {
        &self.intended_receivers
    }

    pub fn received(&self) -> Option<&ReceivedObject> {
        self.received.as_ref()
    }

    pub fn transport_behaviour(&self) -> Option<&str> {
        self.transport_behaviour.as_deref()
    }

    pub fn user_defined_parameters(&self) -> &[UserDefinedParameter] {
        &self.user_defined_params
    }

    /// Add a receiver unless an identical one is already listed
    pub fn add_to(&mut self, agent: AgentId) {
        if !self.to.contains(&agent) {
            self.to.push(agent);
        }
    }

    /// Remove receivers named like `agent`; `true` if any was removed
    pub fn remove_to(&mut self, agent: &AgentId) -> bool {
        let before = self.to.len();
        self.to.retain(|a| a.name != agent.name);
        self.to.len() != before
    }

    pub fn set_to(&mut self, to: Vec<AgentId>) {
        self.to.clear();
        for agent in to {
            self.add_to(agent);
        }
    }

    pub fn set_from(&mut self, from: AgentId) {
        self.from = Some(from);
    }

    pub fn set_comments(&mut self, comments: impl Into<String>) {
        self.comments = Some(comments.into());
    }

    pub fn set_acl_representation(&mut self, representation: Representation) {
        self.acl_representation = Some(representation);
    }

    pub fn set_payload_length(&mut self, length: u64) {
        self.payload_length = Some(length);
    }

    pub fn set_payload_encoding(&mut self, encoding: impl Into<String>) {
        self.payload_encoding = Some(encoding.into());
    }

    /// Set the envelope date, truncated to milliseconds.
    pub fn set_date(&mut self, date: DateTime<Utc>) -> Result<(), TimestampOutOfRange> {
        self.date = Some(check_timestamp(date)?);
        Ok(())
    }

    pub fn add_intended_receiver(&mut self, agent: AgentId) {
        if !self.intended_receivers.contains(&agent) {
            self.intended_receivers.push(agent);
        }
    }

    pub fn remove_intended_receiver(&mut self, agent: &AgentId) -> bool {
        let before = self.intended_receivers.len();
        self.intended_receivers.retain(|a| a.name != agent.name);
        self.intended_receivers.len() != before
    }

    pub fn set_received(&mut self, received: ReceivedObject) {
        self.received = Some(received);
    }

    pub fn set_transport_behaviour(&mut self, behaviour: impl Into<String>) {
        self.transport_behaviour = Some(behaviour.into());
    }

    pub fn add_user_defined_parameter(&mut self, param: UserDefinedParameter) {
        self.user_defined_params.push(param);
    }

    /// Fields of `self`, with the ones it lacks taken from `other`.
    /// User-defined parameters are combined; names in `self` win.
    pub fn merge(&self, other: &BaseEnvelope) -> BaseEnvelope {
        let pick_list = |own: &Vec<AgentId>, theirs: &Vec<AgentId>| {
            if own.is_empty() {
                theirs.clone()
            } else {
                own.clone()
            }
        };

        let mut user_defined_params = self.user_defined_params.clone();
        for param in &other.user_defined_params {
            if !user_defined_params.iter().any(|p| p.name == param.name) {
                user_defined_params.push(param.clone());
            }
        }

        BaseEnvelope {
            to: pick_list(&self.to, &other.to),
            from: self.from.clone().or_else(|| other.from.clone()),
            comments: self.comments.clone().or_else(|| other.comments.clone()),
            acl_representation: self.acl_representation.or(other.acl_representation),
            payload_length: self.payload_length.or(other.payload_length),
            payload_encoding: self
                .payload_encoding
                .clone()
                .or_else(|| other.payload_encoding.clone()),
            date: self.date.or(other.date),
            intended_receivers: pick_list(&self.intended_receivers, &other.intended_receivers),
            received: self.received.clone().or_else(|| other.received.clone()),
            transport_behaviour: self
                .transport_behaviour
                .clone()
                .or_else(|| other.transport_behaviour.clone()),
            user_defined_params,
        }
    }

    /// Whether the stamp of this layer was left by `agent`
    pub fn has_stamp(&self, agent: &AgentId) -> bool {
        self.received.as_ref().is_some_and(|r| r.by == agent.name)
    }
}

/// Envelope and encoded message as they travel between platforms
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclEnvelope {
    base: BaseEnvelope,
    extra: Vec<BaseEnvelope>,
    payload: Vec<u8>,
}

impl AclEnvelope {
    pub fn new(base: BaseEnvelope, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            base,
            extra: Vec::new(),
            payload: payload.into(),
        }
    }

    /// Encode `message` as the payload of a new envelope addressed from its
    /// sender to its receivers.
    pub fn for_message(message: &AclMessage, representation: Representation) -> Self {
        let payload = codec::encode(message, representation);
        let mut base = BaseEnvelope::new();
        if let Some(sender) = message.sender() {
            base.set_from(sender.clone());
        }
        base.set_to(message.receivers().to_vec());
        base.set_acl_representation(representation);
        base.set_payload_length(payload.len() as u64);
        base.date = check_timestamp(Utc::now()).ok();
        Self::new(base, payload)
    }

    pub fn base(&self) -> &BaseEnvelope {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut BaseEnvelope {
        &mut self.base
    }

    pub fn set_base(&mut self, base: BaseEnvelope) {
        self.base = base;
    }

    pub fn extra_envelopes(&self) -> &[BaseEnvelope] {
        &self.extra
    }

    pub fn add_extra_envelope(&mut self, envelope: BaseEnvelope) {
        self.extra.push(envelope);
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn set_payload(&mut self, payload: impl Into<Vec<u8>>) {
        self.payload = payload.into();
    }

    /// The base envelope with every extra envelope applied in order; later
    /// envelopes override earlier ones.
    pub fn flattened(&self) -> BaseEnvelope {
        self.extra
            .iter()
            .fold(self.base.clone(), |envelope, extra| extra.merge(&envelope))
    }

    /// Decode the payload, using the representation the envelope names or
    /// detecting it when none is named.
    pub fn message(&self, options: DecodeOptions) -> Result<AclMessage, DecodeError> {
        match self.flattened().acl_representation {
            Some(representation) => {
                codec::codec_for(representation).decode_with(&self.payload, options)
            }
            None => codec::decode_with(&self.payload, options),
        }
    }

    /// Record that `agent` handled the envelope: an extra envelope whose
    /// received object is `agent`'s name, the current time and a fresh id.
    pub fn stamp(&mut self, agent: &AgentId) {
        let now = Utc::now();
        let Ok(received) = ReceivedObject::new(agent.name.clone(), now) else {
            return;
        };
        let mut envelope = BaseEnvelope::new();
        envelope.set_received(received.with_id(uuid::Uuid::new_v4().to_string()));
        self.extra.push(envelope);
    }

    pub fn has_stamp(&self, agent: &AgentId) -> bool {
        self.extra.iter().any(|envelope| envelope.has_stamp(agent))
    }

    /// Transport services that stamped the envelope, in stamping order
    pub fn delivery_path(&self) -> Vec<AgentId> {
        self.extra
            .iter()
            .filter_map(|envelope| envelope.received.as_ref())
            .map(|received| AgentId::new(received.by.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl_message::Performative;

    #[test]
    fn test_add_to_deduplicates() {
        let mut envelope = BaseEnvelope::new();
        envelope.add_to(AgentId::new("a"));
        envelope.add_to(AgentId::new("a"));
        envelope.add_to(AgentId::new("b"));
        assert_eq!(envelope.to().len(), 2);

        assert!(envelope.remove_to(&AgentId::new("a")));
        assert!(!envelope.remove_to(&AgentId::new("a")));
        assert_eq!(envelope.to(), [AgentId::new("b")]);

        envelope.add_intended_receiver(AgentId::new("c"));
        envelope.add_intended_receiver(AgentId::new("c"));
        assert_eq!(envelope.intended_receivers().len(), 1);
    }

    #[test]
    fn test_merge_fills_missing_fields() {
        let mut own = BaseEnvelope::new();
        own.set_comments("mine");
        own.add_user_defined_parameter(UserDefinedParameter::new("hop", "1"));

        let mut other = BaseEnvelope::new();
        other.set_comments("theirs");
        other.add_to(AgentId::new("b"));
        other.set_transport_behaviour("reliable");
        other.add_user_defined_parameter(UserDefinedParameter::new("hop", "0"));
        other.add_user_defined_parameter(UserDefinedParameter::new("zone", "north"));

        let merged = own.merge(&other);
        assert_eq!(merged.comments(), Some("mine"));
        assert_eq!(merged.to(), [AgentId::new("b")]);
        assert_eq!(merged.transport_behaviour(), Some("reliable"));
        assert_eq!(
            merged.user_defined_parameters(),
            [
                UserDefinedParameter::new("hop", "1"),
                UserDefinedParameter::new("zone", "north")
            ]
        );
    }

    #[test]
    fn test_flatten_later_envelopes_win() {
        let mut base = BaseEnvelope::new();
        base.set_from(AgentId::new("sender"));
        base.set_comments("base");
        let mut envelope = AclEnvelope::new(base, Vec::new());

        let mut first = BaseEnvelope::new();
        first.add_to(AgentId::new("extra-receiver"));
        first.set_comments("first");
        envelope.add_extra_envelope(first);
        let mut second = BaseEnvelope::new();
        second.set_comments("second");
        envelope.add_extra_envelope(second);

        let flat = envelope.flattened();
        assert_eq!(flat.from(), Some(&AgentId::new("sender")));
        assert_eq!(flat.to(), [AgentId::new("extra-receiver")]);
        assert_eq!(flat.comments(), Some("second"));
        assert!(envelope.base().to().is_empty());
    }

    #[test]
    fn test_stamping_records_delivery_path() {
        let msg = AclMessage::new(Performative::Request)
            .with_sender(AgentId::new("test-sender"))
            .with_receiver(AgentId::new("test-receiver"))
            .with_content("test-content");
        let mut envelope = AclEnvelope::for_message(&msg, Representation::Bitefficient);
        assert_eq!(envelope.base().to(), [AgentId::new("test-receiver")]);

        let hops = ["mts-0", "mts-1", "mts-2"];
        for hop in hops {
            envelope.stamp(&AgentId::new(hop));
        }

        let path: Vec<String> = envelope.delivery_path().into_iter().map(|a| a.name).collect();
        assert_eq!(path, hops);
        assert_eq!(envelope.extra_envelopes().len(), hops.len());
        for extra in envelope.extra_envelopes() {
            assert!(!extra.received().unwrap().id().is_empty());
        }
        assert!(envelope.has_stamp(&AgentId::new("mts-1")));
        assert!(!envelope.has_stamp(&AgentId::new("mts-9")));
    }

    #[test]
    fn test_payload_message() {
        let msg = AclMessage::new(Performative::Inform)
            .with_sender(AgentId::new("proxy"))
            .with_conversation_id("c-1")
            .with_content("(done)");
        for representation in [Representation::Bitefficient, Representation::String] {
            let envelope = AclEnvelope::for_message(&msg, representation);
            assert_eq!(
                envelope.base().payload_length(),
                Some(envelope.payload().len() as u64)
            );
            assert_eq!(envelope.message(DecodeOptions::strict()).unwrap(), msg);
        }

        let payload = codec::encode(&msg, Representation::String);
        let unnamed = AclEnvelope::new(BaseEnvelope::new(), payload);
        assert_eq!(unnamed.message(DecodeOptions::strict()).unwrap(), msg);
    }

    #[test]
    fn test_dates_in_wire_range() {
        use chrono::TimeZone;

        let far = Utc.with_ymd_and_hms(10_000, 1, 1, 0, 0, 0).unwrap();
        assert!(BaseEnvelope::new().set_date(far).is_err());
        assert!(ReceivedObject::new("mts", far).is_err());
    }
}
