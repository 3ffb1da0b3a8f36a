// codec/envelope.rs - Bit-Efficient Envelope Codec
//
//! Bit-efficient message envelope (FIPA SC00088) without code tables.
//!
//! ```text
//! 0xFE <parameter>* 0x01      base envelope
//! 0xFD <parameter>* 0x01      extra envelope, repeated
//! <payload>                   encoded message, to the end of input
//! ```
//!
//! Parameters reuse the expression, agent identifier and date encodings of
//! the message codec.

use super::bitefficient::{
    END_OF_COLLECTION, Reader, USER_DEFINED, put_agent_id, put_agent_sequence, put_datetime,
    put_digits, put_expression, put_user_defined,
};
use super::{DecodeError, Representation};
use crate::envelope::{AclEnvelope, BaseEnvelope, ReceivedObject};
use bytes::{BufMut, BytesMut};

const BASE_ENVELOPE: u8 = 0xFE;
const EXTRA_ENVELOPE: u8 = 0xFD;

const PARAM_TO: u8 = 0x02;
const PARAM_FROM: u8 = 0x03;
const PARAM_COMMENTS: u8 = 0x04;
const PARAM_ACL_REPRESENTATION: u8 = 0x05;
const PARAM_PAYLOAD_LENGTH: u8 = 0x06;
const PARAM_PAYLOAD_ENCODING: u8 = 0x07;
const PARAM_DATE: u8 = 0x08;
const PARAM_INTENDED_RECEIVERS: u8 = 0x09;
const PARAM_RECEIVED: u8 = 0x0A;
const PARAM_TRANSPORT_BEHAVIOUR: u8 = 0x0B;

const RECEIVED_FROM: u8 = 0x02;
const RECEIVED_ID: u8 = 0x03;
const RECEIVED_VIA: u8 = 0x04;

const REP_BITEFFICIENT: u8 = 0x10;
const REP_STRING: u8 = 0x11;
const REP_XML: u8 = 0x12;

/// Encode an envelope followed by its payload.
pub fn encode_envelope(envelope: &AclEnvelope) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(128 + envelope.payload().len());
    buf.put_u8(BASE_ENVELOPE);
    put_base(&mut buf, envelope.base());
    for extra in envelope.extra_envelopes() {
        buf.put_u8(EXTRA_ENVELOPE);
        put_base(&mut buf, extra);
    }
    buf.put_slice(envelope.payload());
    buf.to_vec()
}

/// Decode an envelope. Everything after the last envelope is the payload.
pub fn decode_envelope(bytes: &[u8]) -> Result<AclEnvelope, DecodeError> {
    let mut reader = Reader::new(bytes, true);
    match reader.u8("envelope")? {
        BASE_ENVELOPE => {}
        other => {
            return Err(DecodeError::malformed(
                0,
                format!("not a bit-efficient envelope (type 0x{:02x})", other),
            ));
        }
    }

    let base = read_base(&mut reader)?;
    let mut extras = Vec::new();
    while reader.has_remaining() && reader.peek("extra envelope")? == EXTRA_ENVELOPE {
        reader.u8("extra envelope")?;
        extras.push(read_base(&mut reader)?);
    }

    let rest = bytes.len() - reader.position();
    let payload = reader.take(rest, "payload")?;
    let mut envelope = AclEnvelope::new(base, payload);
    for extra in extras {
        envelope.add_extra_envelope(extra);
    }
    Ok(envelope)
}

fn put_base(buf: &mut BytesMut, envelope: &BaseEnvelope) {
    if !envelope.to().is_empty() {
        buf.put_u8(PARAM_TO);
        put_agent_sequence(buf, envelope.to());
    }
    if let Some(from) = envelope.from() {
        buf.put_u8(PARAM_FROM);
        put_agent_id(buf, from);
    }
    if let Some(comments) = envelope.comments() {
        buf.put_u8(PARAM_COMMENTS);
        put_expression(buf, comments.as_bytes());
    }
    if let Some(representation) = envelope.acl_representation() {
        buf.put_u8(PARAM_ACL_REPRESENTATION);
        buf.put_u8(match representation {
            Representation::Bitefficient => REP_BITEFFICIENT,
            Representation::String => REP_STRING,
        });
    }
    if let Some(length) = envelope.payload_length() {
        buf.put_u8(PARAM_PAYLOAD_LENGTH);
        put_digits(buf, length);
    }
    if let Some(encoding) = envelope.payload_encoding() {
        buf.put_u8(PARAM_PAYLOAD_ENCODING);
        put_expression(buf, encoding.as_bytes());
    }
    if let Some(date) = envelope.date() {
        buf.put_u8(PARAM_DATE);
        put_datetime(buf, &date);
    }
    if !envelope.intended_receivers().is_empty() {
        buf.put_u8(PARAM_INTENDED_RECEIVERS);
        put_agent_sequence(buf, envelope.intended_receivers());
    }
    if let Some(received) = envelope.received() {
        buf.put_u8(PARAM_RECEIVED);
        put_received(buf, received);
    }
    if let Some(behaviour) = envelope.transport_behaviour() {
        buf.put_u8(PARAM_TRANSPORT_BEHAVIOUR);
        put_expression(buf, behaviour.as_bytes());
    }
    for param in envelope.user_defined_parameters() {
        buf.put_u8(USER_DEFINED);
        put_user_defined(buf, param);
    }
    buf.put_u8(END_OF_COLLECTION);
}

fn put_received(buf: &mut BytesMut, received: &ReceivedObject) {
    put_expression(buf, received.by().as_bytes());
    put_datetime(buf, &received.date());
    for (code, value) in [
        (RECEIVED_FROM, received.from()),
        (RECEIVED_ID, received.id()),
        (RECEIVED_VIA, received.via()),
    ] {
        if !value.is_empty() {
            buf.put_u8(code);
            put_expression(buf, value.as_bytes());
        }
    }
    buf.put_u8(END_OF_COLLECTION);
}

fn read_base(reader: &mut Reader<'_>) -> Result<BaseEnvelope, DecodeError> {
    let mut envelope = BaseEnvelope::new();
    loop {
        let position = reader.position();
        match reader.u8("envelope parameter or end of envelope")? {
            END_OF_COLLECTION => return Ok(envelope),
            PARAM_TO => {
                for agent in reader.agent_sequence(0)? {
                    envelope.add_to(agent);
                }
            }
            PARAM_FROM => envelope.set_from(reader.agent_id(0)?),
            PARAM_COMMENTS => envelope.set_comments(reader.expression_text()?),
            PARAM_ACL_REPRESENTATION => {
                envelope.set_acl_representation(read_representation(reader)?)
            }
            PARAM_PAYLOAD_LENGTH => {
                let digits = reader.expression_text()?;
                let length = digits.parse().map_err(|_| {
                    DecodeError::malformed(position, format!("invalid payload length '{}'", digits))
                })?;
                envelope.set_payload_length(length);
            }
            PARAM_PAYLOAD_ENCODING => envelope.set_payload_encoding(reader.expression_text()?),
            PARAM_DATE => {
                let date = reader.datetime()?;
                envelope
                    .set_date(date)
                    .map_err(|err| DecodeError::bad_timestamp(position, err.to_string()))?;
            }
            PARAM_INTENDED_RECEIVERS => {
                for agent in reader.agent_sequence(0)? {
                    envelope.add_intended_receiver(agent);
                }
            }
            PARAM_RECEIVED => envelope.set_received(read_received(reader)?),
            PARAM_TRANSPORT_BEHAVIOUR => {
                envelope.set_transport_behaviour(reader.expression_text()?)
            }
            USER_DEFINED => envelope.add_user_defined_parameter(reader.user_defined()?),
            other => {
                return Err(DecodeError::malformed(
                    position,
                    format!("unknown envelope parameter 0x{:02x}", other),
                ));
            }
        }
    }
}

fn read_representation(reader: &mut Reader<'_>) -> Result<Representation, DecodeError> {
    let position = reader.position();
    match reader.u8("acl representation")? {
        REP_BITEFFICIENT => Ok(Representation::Bitefficient),
        REP_STRING => Ok(Representation::String),
        REP_XML => Err(DecodeError::malformed(
            position,
            "xml representation is not supported",
        )),
        USER_DEFINED => {
            let name = reader.expression_text()?;
            [Representation::Bitefficient, Representation::String]
                .into_iter()
                .find(|rep| rep.as_str() == name)
                .ok_or_else(|| {
                    let message = format!("unknown acl representation '{}'", name);
                    DecodeError::malformed(position, message)
                })
        }
        other => Err(DecodeError::malformed(
            position,
            format!("unknown acl representation 0x{:02x}", other),
        )),
    }
}

fn read_received(reader: &mut Reader<'_>) -> Result<ReceivedObject, DecodeError> {
    let by = reader.expression_text()?;
    let position = reader.position();
    let date = reader.datetime()?;
    let mut received = ReceivedObject::new(by, date)
        .map_err(|err| DecodeError::bad_timestamp(position, err.to_string()))?;
    loop {
        let position = reader.position();
        received = match reader.u8("received object parameter")? {
            END_OF_COLLECTION => return Ok(received),
            RECEIVED_FROM => received.with_from(reader.expression_text()?),
            RECEIVED_ID => received.with_id(reader.expression_text()?),
            RECEIVED_VIA => received.with_via(reader.expression_text()?),
            other => {
                return Err(DecodeError::malformed(
                    position,
                    format!("unknown received object parameter 0x{:02x}", other),
                ));
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::bitefficient::BIN_DECIMAL_NUMBER;
    use crate::acl_message::{AclMessage, AgentId, Performative, UserDefinedParameter};
    use crate::codec::{DecodeErrorKind, DecodeOptions};
    use chrono::{TimeZone, Utc};

    fn base_envelope() -> BaseEnvelope {
        let date = Utc.with_ymd_and_hms(2010, 12, 2, 12, 0, 0).unwrap();
        let mut base = BaseEnvelope::new();
        base.set_from(AgentId::new("from").with_address("http://from.example:4000"));
        base.set_date(date).unwrap();
        base.set_transport_behaviour("transport-behaviour");
        base.set_acl_representation(Representation::Bitefficient);
        base.set_comments("comments with spaces");
        base.add_intended_receiver(AgentId::new("receiver-0"));
        base.add_intended_receiver(AgentId::new("receiver-1"));
        base.set_received(
            ReceivedObject::new("mts-0", date)
                .unwrap()
                .with_from("from-mts")
                .with_id("received-id")
                .with_via("via"),
        );
        base.add_user_defined_parameter(UserDefinedParameter::new("hops", "3"));
        base
    }

    fn sample_message() -> AclMessage {
        AclMessage::new(Performative::Inform)
            .with_sender(AgentId::new("from"))
            .with_receiver(AgentId::new("to"))
            .with_content("test-content")
            .with_conversation_id("envelope-1")
    }

    #[test]
    fn test_envelope_roundtrip() {
        let msg = sample_message();
        let payload = crate::codec::encode(&msg, Representation::Bitefficient);
        let mut base = base_envelope();
        base.set_payload_length(payload.len() as u64);
        let mut envelope = AclEnvelope::new(base, payload);

        let mut extra = BaseEnvelope::new();
        extra.add_to(AgentId::new("to"));
        envelope.add_extra_envelope(extra.clone());

        let bytes = encode_envelope(&envelope);
        assert_eq!(bytes[0], BASE_ENVELOPE);
        let decoded = decode_envelope(&bytes).unwrap();
        assert_eq!(decoded, envelope);
        assert_eq!(decoded.flattened().to(), extra.to());
        assert_eq!(decoded.message(DecodeOptions::strict()).unwrap(), msg);
    }

    #[test]
    fn test_stamped_envelope_roundtrip() {
        let mut envelope = AclEnvelope::for_message(&sample_message(), Representation::String);
        for hop in ["mts-0", "mts-1", "mts-2"] {
            envelope.stamp(&AgentId::new(hop));
        }

        let decoded = decode_envelope(&encode_envelope(&envelope)).unwrap();
        let path: Vec<String> = decoded.delivery_path().into_iter().map(|a| a.name).collect();
        assert_eq!(path, ["mts-0", "mts-1", "mts-2"]);
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_payload_length_digits() {
        for length in [0u64, 7, 42, 12345, u64::MAX] {
            let mut base = BaseEnvelope::new();
            base.set_payload_length(length);
            let bytes = encode_envelope(&AclEnvelope::new(base, Vec::new()));
            assert_eq!(bytes[1], PARAM_PAYLOAD_LENGTH);
            assert_eq!(bytes[2], BIN_DECIMAL_NUMBER);
            let decoded = decode_envelope(&bytes).unwrap();
            assert_eq!(decoded.base().payload_length(), Some(length));
        }
    }

    #[test]
    fn test_empty_envelope_layout() {
        let bytes = encode_envelope(&AclEnvelope::new(BaseEnvelope::new(), b"(inform)".to_vec()));
        assert_eq!(&bytes[..2], &[BASE_ENVELOPE, END_OF_COLLECTION]);
        assert_eq!(&bytes[2..], b"(inform)");
    }

    #[test]
    fn test_representation_by_name() {
        let name = Representation::String.as_str().as_bytes();
        let mut bytes = vec![BASE_ENVELOPE, PARAM_ACL_REPRESENTATION, USER_DEFINED, 0x10];
        bytes.extend_from_slice(name);
        bytes.extend_from_slice(&[0x00, END_OF_COLLECTION]);
        let decoded = decode_envelope(&bytes).unwrap();
        assert_eq!(decoded.base().acl_representation(), Some(Representation::String));

        let xml = [BASE_ENVELOPE, PARAM_ACL_REPRESENTATION, REP_XML, END_OF_COLLECTION];
        assert_eq!(
            decode_envelope(&xml).unwrap_err().kind,
            DecodeErrorKind::MalformedStructure
        );
    }

    #[test]
    fn test_malformed_envelopes() {
        assert_eq!(
            decode_envelope(&[0xFA, 0x10]).unwrap_err().kind,
            DecodeErrorKind::MalformedStructure
        );
        assert_eq!(
            decode_envelope(&[BASE_ENVELOPE, 0x7F, END_OF_COLLECTION])
                .unwrap_err()
                .kind,
            DecodeErrorKind::MalformedStructure
        );
        assert_eq!(
            decode_envelope(&[BASE_ENVELOPE, PARAM_TO]).unwrap_err().kind,
            DecodeErrorKind::TruncatedInput
        );
        assert_eq!(
            decode_envelope(&[]).unwrap_err().kind,
            DecodeErrorKind::TruncatedInput
        );
    }
}
