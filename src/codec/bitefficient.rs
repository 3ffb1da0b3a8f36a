// codec/bitefficient.rs - FIPA Bit-Efficient ACL Codec
//
//! Bit-efficient ACL representation (FIPA SC00069) without code tables.
//!
//! ```text
//! 0xFA 0x10 <performative> <parameter>* 0x01
//! ```
//!
//! Every parameter is tagged by a one byte code; strings are either
//! null-terminated words (`0x10`) or length-prefixed byte sequences
//! (`0x16`/`0x17`/`0x19`), so binary content survives untouched.

use super::datetime::{bin_date_digits, format_datetime, from_fields};
use super::{
    DecodeError, DecodeErrorKind, DecodeOptions, MAX_NESTING_DEPTH, MessageCodec, Representation,
    is_fipa_word,
};
use crate::acl_message::{AclMessage, AgentId, Performative, UserDefinedParameter};
use bytes::{Buf, BufMut, BytesMut};
use chrono::{DateTime, Utc};
use tracing::warn;

const MESSAGE_TYPE: u8 = 0xFA;
const MESSAGE_TYPE_CODETABLE: u8 = 0xFB;
const MESSAGE_TYPE_CODETABLE_ID: u8 = 0xFC;
const VERSION: u8 = 0x10;

pub(super) const END_OF_COLLECTION: u8 = 0x01;
pub(super) const USER_DEFINED: u8 = 0x00;

const PARAM_SENDER: u8 = 0x02;
const PARAM_RECEIVER: u8 = 0x03;
const PARAM_CONTENT: u8 = 0x04;
const PARAM_REPLY_WITH: u8 = 0x05;
const PARAM_REPLY_BY: u8 = 0x06;
const PARAM_IN_REPLY_TO: u8 = 0x07;
const PARAM_REPLY_TO: u8 = 0x08;
const PARAM_LANGUAGE: u8 = 0x09;
const PARAM_ENCODING: u8 = 0x0A;
const PARAM_ONTOLOGY: u8 = 0x0B;
const PARAM_PROTOCOL: u8 = 0x0C;
const PARAM_CONVERSATION_ID: u8 = 0x0D;

const AGENT_IDENTIFIER: u8 = 0x02;
const AGENT_ADDRESSES: u8 = 0x02;
const AGENT_RESOLVERS: u8 = 0x03;
const AGENT_USER_DEFINED: u8 = 0x04;

const BIN_WORD: u8 = 0x10;
const BIN_WORD_INDEX: u8 = 0x11;
pub(super) const BIN_DECIMAL_NUMBER: u8 = 0x12;
const BIN_HEX_NUMBER: u8 = 0x13;
const BIN_STRING_LITERAL: u8 = 0x14;
const BIN_STRING_INDEX: u8 = 0x15;
const BIN_STRING_LEN8: u8 = 0x16;
const BIN_STRING_LEN16: u8 = 0x17;
const BIN_STRING_LEN16_INDEX: u8 = 0x18;
const BIN_STRING_LEN32: u8 = 0x19;
const BIN_EXPRESSION_STRING: u8 = 0xFF;

const DATETIME_ABSOLUTE: u8 = 0x20;
const DATETIME_TYPE_DESIGNATOR: u8 = 0x04;
const BIN_DATE_LEN: usize = 9;
/// Bytes per BinDate field: year, month, day, hour, minute, second, millis.
/// A zero nibble inside a field is padding.
const BIN_DATE_FIELDS: [usize; 7] = [2, 1, 1, 1, 1, 1, 2];

/// Bit-efficient ACL codec
#[derive(Debug, Clone, Copy, Default)]
pub struct BitefficientCodec;

impl MessageCodec for BitefficientCodec {
    fn representation(&self) -> Representation {
        Representation::Bitefficient
    }

    fn encode(&self, msg: &AclMessage) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(64 + msg.content().len());
        buf.put_u8(MESSAGE_TYPE);
        buf.put_u8(VERSION);

        match msg.performative().code() {
            Some(code) => buf.put_u8(code),
            None => {
                buf.put_u8(USER_DEFINED);
                put_expression(&mut buf, msg.performative().as_str().as_bytes());
            }
        }

        if let Some(sender) = msg.sender() {
            buf.put_u8(PARAM_SENDER);
            put_agent_id(&mut buf, sender);
        }
        if !msg.receivers().is_empty() {
            buf.put_u8(PARAM_RECEIVER);
            put_agent_sequence(&mut buf, msg.receivers());
        }
        if !msg.content().is_empty() {
            buf.put_u8(PARAM_CONTENT);
            put_bin_string(&mut buf, msg.content());
        }
        put_text_param(&mut buf, PARAM_REPLY_WITH, msg.reply_with());
        if let Some(reply_by) = msg.reply_by() {
            buf.put_u8(PARAM_REPLY_BY);
            put_datetime(&mut buf, &reply_by);
        }
        put_text_param(&mut buf, PARAM_IN_REPLY_TO, msg.in_reply_to());
        if !msg.reply_to().is_empty() {
            buf.put_u8(PARAM_REPLY_TO);
            put_agent_sequence(&mut buf, msg.reply_to());
        }
        put_text_param(&mut buf, PARAM_LANGUAGE, msg.language());
        put_text_param(&mut buf, PARAM_ENCODING, msg.encoding());
        put_text_param(&mut buf, PARAM_ONTOLOGY, msg.ontology());
        put_text_param(&mut buf, PARAM_PROTOCOL, msg.protocol());
        put_text_param(&mut buf, PARAM_CONVERSATION_ID, msg.conversation_id());
        for param in msg.user_defined_parameters() {
            buf.put_u8(USER_DEFINED);
            put_user_defined(&mut buf, param);
        }

        buf.put_u8(END_OF_COLLECTION);
        buf.to_vec()
    }

    fn decode_with(&self, bytes: &[u8], options: DecodeOptions) -> Result<AclMessage, DecodeError> {
        let mut reader = Reader::new(bytes, options.strict);

        match reader.u8("message type")? {
            MESSAGE_TYPE => {}
            MESSAGE_TYPE_CODETABLE | MESSAGE_TYPE_CODETABLE_ID => {
                return Err(DecodeError::malformed(0, "code tables are not supported"));
            }
            other => {
                return Err(DecodeError::malformed(
                    0,
                    format!("not a bit-efficient message (type 0x{:02x})", other),
                ));
            }
        }
        reader.u8("version")?;

        let performative = reader.performative(options)?;
        let mut msg = AclMessage::new(performative);

        loop {
            let position = reader.position();
            let code = match reader.u8("message parameter or end of message") {
                Ok(code) => code,
                Err(_) if !options.strict => {
                    warn!(position, "Bit-efficient message not terminated, keeping parsed fields");
                    return Ok(msg);
                }
                Err(err) => return Err(err),
            };
            if code == END_OF_COLLECTION {
                break;
            }

            match reader.parameter(code, &mut msg) {
                Ok(()) => {}
                Err(err) if !options.strict && err.kind == DecodeErrorKind::BadTimestamp => {
                    warn!(position = err.position, error = %err, "Dropping unparseable reply-by");
                }
                Err(err) if !options.strict => {
                    // Parameters carry no length, so nothing after a bad one can be trusted.
                    warn!(
                        position = err.position,
                        error = %err,
                        "Stopping at unparseable parameter, keeping earlier fields"
                    );
                    return Ok(msg);
                }
                Err(err) => return Err(err),
            }
        }

        if options.strict && reader.has_remaining() {
            return Err(DecodeError::malformed(
                reader.position(),
                "trailing bytes after end of message",
            ));
        }
        Ok(msg)
    }
}

// =============================================================================
// Encoding
// =============================================================================

fn put_text_param(buf: &mut BytesMut, code: u8, value: &str) {
    if !value.is_empty() {
        buf.put_u8(code);
        put_expression(buf, value.as_bytes());
    }
}

/// Words go out as `BinWord`, everything else as a length-prefixed string.
pub(super) fn put_expression(buf: &mut BytesMut, value: &[u8]) {
    match std::str::from_utf8(value) {
        Ok(word) if is_fipa_word(word) => {
            buf.put_u8(BIN_WORD);
            buf.put_slice(value);
            buf.put_u8(0x00);
        }
        _ => put_bin_string(buf, value),
    }
}

pub(super) fn put_bin_string(buf: &mut BytesMut, value: &[u8]) {
    let len = value.len();
    if len <= u8::MAX as usize {
        buf.put_u8(BIN_STRING_LEN8);
        buf.put_u8(len as u8);
    } else if len <= u16::MAX as usize {
        buf.put_u8(BIN_STRING_LEN16);
        buf.put_u16(len as u16);
    } else {
        buf.put_u8(BIN_STRING_LEN32);
        buf.put_u32(len as u32);
    }
    buf.put_slice(value);
}

pub(super) fn put_user_defined(buf: &mut BytesMut, param: &UserDefinedParameter) {
    put_expression(buf, param.name.as_bytes());
    put_expression(buf, param.value.as_bytes());
}

pub(super) fn put_agent_id(buf: &mut BytesMut, agent: &AgentId) {
    buf.put_u8(AGENT_IDENTIFIER);
    put_expression(buf, agent.name.as_bytes());

    if !agent.addresses.is_empty() {
        buf.put_u8(AGENT_ADDRESSES);
        for address in &agent.addresses {
            put_expression(buf, address.as_bytes());
        }
        buf.put_u8(END_OF_COLLECTION);
    }
    if !agent.resolvers.is_empty() {
        buf.put_u8(AGENT_RESOLVERS);
        put_agent_sequence(buf, &agent.resolvers);
    }
    for param in &agent.params {
        buf.put_u8(AGENT_USER_DEFINED);
        put_user_defined(buf, param);
    }
    buf.put_u8(END_OF_COLLECTION);
}

pub(super) fn put_agent_sequence(buf: &mut BytesMut, agents: &[AgentId]) {
    for agent in agents {
        put_agent_id(buf, agent);
    }
    buf.put_u8(END_OF_COLLECTION);
}

pub(super) fn put_datetime(buf: &mut BytesMut, ts: &DateTime<Utc>) {
    buf.put_u8(DATETIME_ABSOLUTE);
    let digits = bin_date_digits(ts);
    for pair in digits.as_bytes().chunks(2) {
        let high = pair[0] - b'0' + 1;
        let low = pair.get(1).map(|d| d - b'0' + 1).unwrap_or(0);
        buf.put_u8(high << 4 | low);
    }
}

/// Decimal number as packed digit nibbles, ended by a zero nibble.
pub(super) fn put_digits(buf: &mut BytesMut, value: u64) {
    buf.put_u8(BIN_DECIMAL_NUMBER);
    let digits = value.to_string();
    for pair in digits.as_bytes().chunks(2) {
        let high = pair[0] - b'0' + 1;
        let low = pair.get(1).map(|d| d - b'0' + 1).unwrap_or(0);
        buf.put_u8(high << 4 | low);
    }
    if digits.len() % 2 == 0 {
        buf.put_u8(0x00);
    }
}

// =============================================================================
// Decoding
// =============================================================================

pub(super) struct Reader<'a> {
    input: &'a [u8],
    buf: &'a [u8],
    strict: bool,
}

impl<'a> Reader<'a> {
    pub(super) fn new(input: &'a [u8], strict: bool) -> Self {
        Self {
            input,
            buf: input,
            strict,
        }
    }

    pub(super) fn position(&self) -> usize {
        self.input.len() - self.buf.remaining()
    }

    pub(super) fn has_remaining(&self) -> bool {
        self.buf.has_remaining()
    }

    fn need(&self, n: usize, what: &str) -> Result<(), DecodeError> {
        if self.buf.remaining() < n {
            Err(DecodeError::truncated(
                self.position(),
                format!("expected {}", what),
            ))
        } else {
            Ok(())
        }
    }

    pub(super) fn u8(&mut self, what: &str) -> Result<u8, DecodeError> {
        self.need(1, what)?;
        Ok(self.buf.get_u8())
    }

    pub(super) fn peek(&self, what: &str) -> Result<u8, DecodeError> {
        self.buf.first().copied().ok_or_else(|| {
            DecodeError::truncated(self.position(), format!("expected {}", what))
        })
    }

    pub(super) fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8], DecodeError> {
        self.need(n, what)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn take_until_nul(&mut self, what: &str) -> Result<&'a [u8], DecodeError> {
        let end = self.buf.iter().position(|b| *b == 0x00).ok_or_else(|| {
            DecodeError::truncated(self.input.len(), format!("unterminated {}", what))
        })?;
        let head = &self.buf[..end];
        self.buf = &self.buf[end + 1..];
        Ok(head)
    }

    fn text(&self, bytes: &[u8], position: usize) -> Result<String, DecodeError> {
        if self.strict {
            String::from_utf8(bytes.to_vec())
                .map_err(|_| DecodeError::malformed(position, "text is not valid UTF-8"))
        } else {
            Ok(String::from_utf8_lossy(bytes).into_owned())
        }
    }

    fn performative(&mut self, options: DecodeOptions) -> Result<Performative, DecodeError> {
        let position = self.position();
        let code = self.u8("performative")?;
        if code != USER_DEFINED {
            return Performative::from_code(code).ok_or_else(|| {
                DecodeError::unknown_performative(position, &format!("0x{:02x}", code))
            });
        }

        let raw = self.expression()?;
        let text = self.text(&raw, position)?;
        match text.parse::<Performative>() {
            Ok(performative) => Ok(performative),
            Err(_) if options.allow_unrecognized_performative => {
                Ok(Performative::Unrecognized(text))
            }
            Err(_) => Err(DecodeError::unknown_performative(position, &text)),
        }
    }

    fn parameter(&mut self, code: u8, msg: &mut AclMessage) -> Result<(), DecodeError> {
        match code {
            PARAM_SENDER => msg.set_sender(self.agent_id(0)?),
            PARAM_RECEIVER => {
                for receiver in self.agent_sequence(0)? {
                    msg.add_receiver(receiver);
                }
            }
            PARAM_CONTENT => {
                let content = self.expression()?;
                msg.set_content(content);
            }
            PARAM_REPLY_WITH => msg.set_reply_with(self.expression_text()?),
            PARAM_REPLY_BY => {
                let position = self.position();
                msg.set_reply_by(self.datetime()?)
                    .map_err(|err| DecodeError::bad_timestamp(position, err.to_string()))?;
            }
            PARAM_IN_REPLY_TO => msg.set_in_reply_to(self.expression_text()?),
            PARAM_REPLY_TO => {
                for agent in self.agent_sequence(0)? {
                    msg.add_reply_to(agent);
                }
            }
            PARAM_LANGUAGE => msg.set_language(self.expression_text()?),
            PARAM_ENCODING => msg.set_encoding(self.expression_text()?),
            PARAM_ONTOLOGY => msg.set_ontology(self.expression_text()?),
            PARAM_PROTOCOL => msg.set_protocol(self.expression_text()?),
            PARAM_CONVERSATION_ID => msg.set_conversation_id(self.expression_text()?),
            USER_DEFINED => {
                let param = self.user_defined()?;
                msg.add_user_defined_parameter(param);
            }
            other => {
                return Err(DecodeError::malformed(
                    self.position() - 1,
                    format!("unknown message parameter 0x{:02x}", other),
                ));
            }
        }
        Ok(())
    }

    pub(super) fn user_defined(&mut self) -> Result<UserDefinedParameter, DecodeError> {
        let name = self.expression_text()?;
        let value = self.expression_text()?;
        Ok(UserDefinedParameter::new(name, value))
    }

    pub(super) fn agent_id(&mut self, depth: usize) -> Result<AgentId, DecodeError> {
        let position = self.position();
        if depth >= MAX_NESTING_DEPTH {
            return Err(DecodeError::malformed(
                position,
                "agent identifiers nested too deeply",
            ));
        }
        if self.u8("agent identifier")? != AGENT_IDENTIFIER {
            return Err(DecodeError::malformed(position, "expected agent identifier"));
        }

        let mut agent = AgentId::new(self.expression_text()?);
        loop {
            let position = self.position();
            match self.u8("agent identifier parameter")? {
                END_OF_COLLECTION => break,
                AGENT_ADDRESSES => {
                    while self.peek("address")? != END_OF_COLLECTION {
                        agent.add_address(self.expression_text()?);
                    }
                    self.buf.advance(1);
                }
                AGENT_RESOLVERS => {
                    for resolver in self.agent_sequence(depth + 1)? {
                        agent.add_resolver(resolver);
                    }
                }
                AGENT_USER_DEFINED => {
                    let param = self.user_defined()?;
                    agent.add_user_defined_parameter(param);
                }
                other => {
                    return Err(DecodeError::malformed(
                        position,
                        format!("unknown agent identifier parameter 0x{:02x}", other),
                    ));
                }
            }
        }
        Ok(agent)
    }

    pub(super) fn agent_sequence(&mut self, depth: usize) -> Result<Vec<AgentId>, DecodeError> {
        let mut agents = Vec::new();
        while self.peek("agent identifier")? != END_OF_COLLECTION {
            agents.push(self.agent_id(depth)?);
        }
        self.buf.advance(1);
        Ok(agents)
    }

    pub(super) fn expression_text(&mut self) -> Result<String, DecodeError> {
        let position = self.position();
        let raw = self.expression()?;
        self.text(&raw, position)
    }

    /// Any expression that reduces to a byte sequence: words, strings,
    /// numbers and date tokens.
    pub(super) fn expression(&mut self) -> Result<Vec<u8>, DecodeError> {
        let position = self.position();
        match self.u8("expression")? {
            BIN_WORD => Ok(self.take_until_nul("word")?.to_vec()),
            BIN_EXPRESSION_STRING => {
                let code = self.u8("string")?;
                self.bin_string(code, self.position() - 1)
            }
            BIN_DECIMAL_NUMBER => Ok(self.digits()?.into_bytes()),
            BIN_HEX_NUMBER => {
                let digits = self.digits()?;
                let value: u64 = digits.parse().map_err(|_| {
                    DecodeError::malformed(position, format!("invalid hex number '{}'", digits))
                })?;
                Ok(format!("0x{:x}", value).into_bytes())
            }
            0x20..=0x26 => {
                self.buf = &self.input[position..];
                Ok(format_datetime(&self.datetime()?).into_bytes())
            }
            BIN_WORD_INDEX | BIN_STRING_INDEX | BIN_STRING_LEN16_INDEX => Err(
                DecodeError::malformed(position, "code table references are not supported"),
            ),
            code => self.bin_string(code, position),
        }
    }

    fn bin_string(&mut self, code: u8, position: usize) -> Result<Vec<u8>, DecodeError> {
        match code {
            BIN_STRING_LITERAL => {
                let literal = self.string_literal()?;
                if self.u8("string terminator")? != 0x00 {
                    return Err(DecodeError::malformed(
                        self.position() - 1,
                        "string literal not null-terminated",
                    ));
                }
                Ok(literal)
            }
            BIN_STRING_LEN8 => {
                let len = self.u8("string length")? as usize;
                Ok(self.take(len, "string bytes")?.to_vec())
            }
            BIN_STRING_LEN16 => {
                self.need(2, "string length")?;
                let len = self.buf.get_u16() as usize;
                Ok(self.take(len, "string bytes")?.to_vec())
            }
            BIN_STRING_LEN32 => {
                self.need(4, "string length")?;
                let len = self.buf.get_u32() as usize;
                Ok(self.take(len, "string bytes")?.to_vec())
            }
            BIN_STRING_INDEX | BIN_STRING_LEN16_INDEX => Err(DecodeError::malformed(
                position,
                "code table references are not supported",
            )),
            other => Err(DecodeError::malformed(
                position,
                format!("expected word or string, found 0x{:02x}", other),
            )),
        }
    }

    /// `"..."` with backslash escapes, `#n"` followed by n raw bytes, or raw
    /// bytes up to the terminator.
    fn string_literal(&mut self) -> Result<Vec<u8>, DecodeError> {
        let position = self.position();
        match self.peek("string literal")? {
            b'"' => {
                self.buf.advance(1);
                let mut out = Vec::new();
                loop {
                    match self.u8("closing quote")? {
                        b'"' => return Ok(out),
                        b'\\' => out.push(self.u8("escaped character")?),
                        b => out.push(b),
                    }
                }
            }
            b'#' => {
                self.buf.advance(1);
                let mut len: usize = 0;
                loop {
                    match self.u8("byte length")? {
                        b'"' => break,
                        d @ b'0'..=b'9' => {
                            len = len
                                .checked_mul(10)
                                .and_then(|l| l.checked_add((d - b'0') as usize))
                                .ok_or_else(|| {
                                    DecodeError::malformed(position, "byte length overflow")
                                })?;
                        }
                        _ => {
                            return Err(DecodeError::malformed(
                                position,
                                "invalid byte length encoded string",
                            ));
                        }
                    }
                }
                Ok(self.take(len, "string bytes")?.to_vec())
            }
            _ => {
                let raw = self.take_until_nul("string")?;
                // Put the terminator back for the caller.
                self.buf = &self.input[self.position() - 1..];
                Ok(raw.to_vec())
            }
        }
    }

    /// Packed decimal digits; a zero nibble ends the number.
    fn digits(&mut self) -> Result<String, DecodeError> {
        let position = self.position();
        let mut out = String::new();
        loop {
            let byte = self.u8("digits")?;
            for nibble in [byte >> 4, byte & 0x0F] {
                match nibble {
                    0x00 => return Ok(out),
                    0x01..=0x0A => out.push((b'0' + nibble - 1) as char),
                    0x0C => out.push('+'),
                    0x0D => out.push('E'),
                    0x0E => out.push('-'),
                    0x0F => out.push('.'),
                    _ => {
                        return Err(DecodeError::malformed(
                            position,
                            format!("invalid digit nibble 0x{:x}", nibble),
                        ));
                    }
                }
            }
        }
    }

    pub(super) fn datetime(&mut self) -> Result<DateTime<Utc>, DecodeError> {
        let position = self.position();
        let code = self.u8("date time token")?;
        if !(0x20..=0x26).contains(&code) || code == 0x23 {
            return Err(DecodeError::malformed(
                position,
                format!("expected date time token, found 0x{:02x}", code),
            ));
        }

        let date = self.take(BIN_DATE_LEN, "date")?;
        if code & DATETIME_TYPE_DESIGNATOR != 0 {
            self.u8("type designator")?;
        }
        if code & 0x03 != 0 {
            return Err(DecodeError::bad_timestamp(
                position,
                "relative date times are not supported",
            ));
        }

        let mut fields = [0u32; BIN_DATE_FIELDS.len()];
        let mut offset = 0;
        for (field, width) in fields.iter_mut().zip(BIN_DATE_FIELDS) {
            for byte in &date[offset..offset + width] {
                for nibble in [byte >> 4, byte & 0x0F] {
                    match nibble {
                        0x00 => {}
                        0x01..=0x0A => *field = *field * 10 + (nibble - 1) as u32,
                        _ => {
                            return Err(DecodeError::bad_timestamp(
                                position,
                                format!("invalid date digit nibble 0x{:x}", nibble),
                            ));
                        }
                    }
                }
            }
            offset += width;
        }

        let [year, month, day, hour, minute, second, millis] = fields;
        from_fields(year as i32, month, day, hour, minute, second, millis)
            .ok_or_else(|| DecodeError::bad_timestamp(position, "date out of range"))
    }
}
