// codec/string.rs - FIPA String ACL Codec
//
//! String ACL representation (FIPA SC00070)
//!
//! ```text
//! (inform
//!   :sender (agent-identifier :name alice :addresses (sequence tcp://host:7000))
//!   :receiver (set (agent-identifier :name bob))
//!   :content "(price apple 10)"
//!   :language fipa-sl
//!   :reply-by 20101223T120037000
//!   :X-priority high)
//! ```
//!
//! Decoding happens in two passes: the input bytes are read into a tree of
//! words, strings and lists, and the tree is then interpreted as a message.

use super::datetime::{format_datetime, parse_datetime};
use super::{
    DecodeError, DecodeOptions, MAX_NESTING_DEPTH, MessageCodec, Representation, is_fipa_word,
};
use crate::acl_message::{AclMessage, AgentId, Performative, UserDefinedParameter};
use bytes::{BufMut, BytesMut};
use tracing::warn;

const AGENT_IDENTIFIER: &[u8] = b"agent-identifier";
const USER_DEFINED_PREFIX: &str = "X-";

/// String ACL codec
#[derive(Debug, Clone, Copy, Default)]
pub struct StringCodec;

impl MessageCodec for StringCodec {
    fn representation(&self) -> Representation {
        Representation::String
    }

    fn encode(&self, msg: &AclMessage) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(128 + msg.content().len());
        buf.put_u8(b'(');
        put_value(&mut buf, msg.performative().as_str());

        if let Some(sender) = msg.sender() {
            put_keyword(&mut buf, "sender");
            put_agent_id(&mut buf, sender);
        }
        if !msg.receivers().is_empty() {
            put_keyword(&mut buf, "receiver");
            put_agent_set(&mut buf, msg.receivers());
        }
        if !msg.reply_to().is_empty() {
            put_keyword(&mut buf, "reply-to");
            put_agent_set(&mut buf, msg.reply_to());
        }
        if !msg.content().is_empty() {
            put_keyword(&mut buf, "content");
            put_content(&mut buf, msg.content());
        }
        put_text_param(&mut buf, "language", msg.language());
        put_text_param(&mut buf, "encoding", msg.encoding());
        put_text_param(&mut buf, "ontology", msg.ontology());
        put_text_param(&mut buf, "protocol", msg.protocol());
        put_text_param(&mut buf, "conversation-id", msg.conversation_id());
        put_text_param(&mut buf, "reply-with", msg.reply_with());
        put_text_param(&mut buf, "in-reply-to", msg.in_reply_to());
        if let Some(reply_by) = msg.reply_by() {
            put_keyword(&mut buf, "reply-by");
            buf.put_slice(format_datetime(&reply_by).as_bytes());
        }
        for param in msg.user_defined_parameters() {
            put_user_defined(&mut buf, param);
        }

        buf.put_u8(b')');
        buf.to_vec()
    }

    fn decode_with(&self, bytes: &[u8], options: DecodeOptions) -> Result<AclMessage, DecodeError> {
        let mut reader = Reader::new(bytes, options.strict);
        let root = reader.node(0)?;

        reader.skip_whitespace();
        if reader.pos < bytes.len() {
            if options.strict {
                return Err(DecodeError::malformed(
                    reader.pos,
                    "trailing bytes after message",
                ));
            }
            warn!(position = reader.pos, "Ignoring trailing bytes after message");
        }

        interpret_message(root, options)
    }
}

// =============================================================================
// Encoding
// =============================================================================

fn put_keyword(buf: &mut BytesMut, keyword: &str) {
    buf.put_slice(b" :");
    buf.put_slice(keyword.as_bytes());
    buf.put_u8(b' ');
}

fn put_value(buf: &mut BytesMut, value: &str) {
    if is_fipa_word(value) {
        buf.put_slice(value.as_bytes());
    } else {
        put_quoted(buf, value.as_bytes());
    }
}

fn put_quoted(buf: &mut BytesMut, value: &[u8]) {
    buf.put_u8(b'"');
    for &b in value {
        if b == b'"' || b == b'\\' {
            buf.put_u8(b'\\');
        }
        buf.put_u8(b);
    }
    buf.put_u8(b'"');
}

/// Text content is quoted; anything else goes out as `#n"` plus raw bytes.
fn put_content(buf: &mut BytesMut, content: &[u8]) {
    if std::str::from_utf8(content).is_ok() {
        put_quoted(buf, content);
    } else {
        buf.put_slice(format!("#{}\"", content.len()).as_bytes());
        buf.put_slice(content);
    }
}

fn put_text_param(buf: &mut BytesMut, keyword: &str, value: &str) {
    if !value.is_empty() {
        put_keyword(buf, keyword);
        put_value(buf, value);
    }
}

fn put_user_defined(buf: &mut BytesMut, param: &UserDefinedParameter) {
    put_keyword(buf, &format!("{}{}", USER_DEFINED_PREFIX, escape_name(&param.name)));
    put_value(buf, &param.value);
}

/// Keywords are bare words, so bytes that would end the word (or start an
/// escape) are written as `%XX`.
fn escape_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '\u{0}'..=' ' | '\u{7f}' | '(' | ')' | '"' | '%' => {
                out.push_str(&format!("%{:02X}", c as u32));
            }
            _ => out.push(c),
        }
    }
    out
}

/// Reverse of [`escape_name`]. A `%` not followed by two hex digits is kept.
fn unescape_name(raw: &[u8]) -> Vec<u8> {
    let hex = |b: u8| (b as char).to_digit(16);
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'%' && i + 2 < raw.len() {
            if let (Some(hi), Some(lo)) = (hex(raw[i + 1]), hex(raw[i + 2])) {
                out.push((hi * 16 + lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(raw[i]);
        i += 1;
    }
    out
}

fn put_agent_id(buf: &mut BytesMut, agent: &AgentId) {
    buf.put_u8(b'(');
    buf.put_slice(AGENT_IDENTIFIER);
    put_keyword(buf, "name");
    put_value(buf, &agent.name);

    if !agent.addresses.is_empty() {
        put_keyword(buf, "addresses");
        buf.put_slice(b"(sequence");
        for address in &agent.addresses {
            buf.put_u8(b' ');
            put_value(buf, address);
        }
        buf.put_u8(b')');
    }
    if !agent.resolvers.is_empty() {
        put_keyword(buf, "resolvers");
        buf.put_slice(b"(sequence");
        for resolver in &agent.resolvers {
            buf.put_u8(b' ');
            put_agent_id(buf, resolver);
        }
        buf.put_u8(b')');
    }
    for param in &agent.params {
        put_user_defined(buf, param);
    }
    buf.put_u8(b')');
}

fn put_agent_set(buf: &mut BytesMut, agents: &[AgentId]) {
    buf.put_slice(b"(set");
    for agent in agents {
        buf.put_u8(b' ');
        put_agent_id(buf, agent);
    }
    buf.put_u8(b')');
}

// =============================================================================
// Reading
// =============================================================================

#[derive(Debug)]
enum Expr {
    Word(Vec<u8>),
    Str(Vec<u8>),
    List(Vec<Node>),
}

#[derive(Debug)]
struct Node {
    expr: Expr,
    position: usize,
}

struct Reader<'a> {
    input: &'a [u8],
    pos: usize,
    strict: bool,
}

impl<'a> Reader<'a> {
    fn new(input: &'a [u8], strict: bool) -> Self {
        Self {
            input,
            pos: 0,
            strict,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn node(&mut self, depth: usize) -> Result<Node, DecodeError> {
        self.skip_whitespace();
        let position = self.pos;
        let expr = match self.peek() {
            None => return Err(DecodeError::truncated(position, "expected expression")),
            Some(b'(') => Expr::List(self.list(depth)?),
            Some(b')') => return Err(DecodeError::malformed(position, "unexpected ')'")),
            Some(b'"') => Expr::Str(self.quoted()?),
            Some(b'#') => Expr::Str(self.byte_string()?),
            Some(_) => Expr::Word(self.word()),
        };
        Ok(Node { expr, position })
    }

    fn list(&mut self, depth: usize) -> Result<Vec<Node>, DecodeError> {
        if depth >= MAX_NESTING_DEPTH {
            return Err(DecodeError::malformed(self.pos, "lists nested too deeply"));
        }
        let start = self.pos;
        self.pos += 1;

        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                None if self.strict => {
                    return Err(DecodeError::truncated(self.pos, "unclosed list"));
                }
                None => {
                    warn!(position = start, "Closing list left open at end of input");
                    break;
                }
                Some(b')') => {
                    self.pos += 1;
                    break;
                }
                Some(_) => items.push(self.node(depth + 1)?),
            }
        }
        Ok(items)
    }

    fn word(&mut self) -> Vec<u8> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() || matches!(b, b'(' | b')' | b'"') {
                break;
            }
            self.pos += 1;
        }
        self.input[start..self.pos].to_vec()
    }

    fn quoted(&mut self) -> Result<Vec<u8>, DecodeError> {
        let start = self.pos;
        self.pos += 1;

        let mut out = Vec::new();
        loop {
            let Some(b) = self.peek() else {
                return Err(DecodeError::truncated(start, "unterminated string"));
            };
            self.pos += 1;
            match b {
                b'"' => return Ok(out),
                b'\\' => {
                    let Some(escaped) = self.peek() else {
                        return Err(DecodeError::truncated(start, "unterminated string"));
                    };
                    self.pos += 1;
                    out.push(escaped);
                }
                _ => out.push(b),
            }
        }
    }

    /// `#n"` followed by exactly n raw bytes.
    fn byte_string(&mut self) -> Result<Vec<u8>, DecodeError> {
        let start = self.pos;
        self.pos += 1;

        let digits_start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        let len = std::str::from_utf8(&self.input[digits_start..self.pos])
            .ok()
            .and_then(|digits| digits.parse::<usize>().ok())
            .ok_or_else(|| DecodeError::malformed(start, "invalid byte string length"))?;
        if self.peek() != Some(b'"') {
            return Err(DecodeError::malformed(start, "expected '\"' after byte string length"));
        }
        self.pos += 1;

        if self.input.len() - self.pos < len {
            return Err(DecodeError::truncated(
                self.input.len(),
                format!("byte string announces {} bytes", len),
            ));
        }
        let out = self.input[self.pos..self.pos + len].to_vec();
        self.pos += len;
        Ok(out)
    }
}

// =============================================================================
// Interpretation
// =============================================================================

fn interpret_message(root: Node, options: DecodeOptions) -> Result<AclMessage, DecodeError> {
    let Expr::List(items) = root.expr else {
        return Err(DecodeError::malformed(root.position, "expected message list"));
    };
    let mut items = items.into_iter();

    let Some(head) = items.next() else {
        return Err(DecodeError::unknown_performative(root.position, ""));
    };
    let mut msg = AclMessage::new(performative(&head, options)?);

    while let Some(key) = items.next() {
        let Some(name) = keyword_name(&key) else {
            let err = DecodeError::malformed(key.position, "expected parameter keyword");
            if options.strict {
                return Err(err);
            }
            warn!(error = %err, "Skipping stray expression");
            continue;
        };
        let Some(value) = items.next() else {
            let err = DecodeError::truncated(key.position, format!("missing value for :{}", name));
            if options.strict {
                return Err(err);
            }
            warn!(error = %err, "Dropping parameter without value");
            break;
        };

        if let Err(err) = apply_parameter(&mut msg, &name, &key, &value, options.strict) {
            if options.strict {
                return Err(err);
            }
            warn!(parameter = %name, error = %err, "Dropping unparseable parameter");
        }
    }

    Ok(msg)
}

fn performative(head: &Node, options: DecodeOptions) -> Result<Performative, DecodeError> {
    let text = text(head, options.strict)?;
    match text.parse::<Performative>() {
        Ok(performative) => Ok(performative),
        Err(_) if options.allow_unrecognized_performative => Ok(Performative::Unrecognized(text)),
        Err(_) => Err(DecodeError::unknown_performative(head.position, &text)),
    }
}

fn apply_parameter(
    msg: &mut AclMessage,
    name: &str,
    key: &Node,
    value: &Node,
    strict: bool,
) -> Result<(), DecodeError> {
    match name.to_ascii_lowercase().as_str() {
        "sender" => msg.set_sender(agent_id(value, strict)?),
        "receiver" => {
            for receiver in agent_set(value, strict)? {
                msg.add_receiver(receiver);
            }
        }
        "reply-to" => {
            for agent in agent_set(value, strict)? {
                msg.add_reply_to(agent);
            }
        }
        "content" => msg.set_content(raw_bytes(value)?.to_vec()),
        "language" => msg.set_language(text(value, strict)?),
        "encoding" => msg.set_encoding(text(value, strict)?),
        "ontology" => msg.set_ontology(text(value, strict)?),
        "protocol" => msg.set_protocol(text(value, strict)?),
        "conversation-id" => msg.set_conversation_id(text(value, strict)?),
        "reply-with" => msg.set_reply_with(text(value, strict)?),
        "in-reply-to" => msg.set_in_reply_to(text(value, strict)?),
        "reply-by" => {
            let token = text(value, strict)?;
            let reply_by = parse_datetime(&token).ok_or_else(|| {
                DecodeError::bad_timestamp(value.position, format!("invalid reply-by '{}'", token))
            })?;
            msg.set_reply_by(reply_by)
                .map_err(|err| DecodeError::bad_timestamp(value.position, err.to_string()))?;
        }
        lower if lower.starts_with("x-") => {
            let param = UserDefinedParameter::new(user_defined_name(key, strict)?, text(value, strict)?);
            msg.add_user_defined_parameter(param);
        }
        _ => {
            return Err(DecodeError::malformed(
                key.position,
                format!("unknown message parameter :{}", name),
            ));
        }
    }
    Ok(())
}

fn agent_id(node: &Node, strict: bool) -> Result<AgentId, DecodeError> {
    let items = match &node.expr {
        Expr::List(items) => items,
        _ => return Err(DecodeError::malformed(node.position, "expected agent-identifier")),
    };
    match items.first() {
        Some(Node {
            expr: Expr::Word(head),
            ..
        }) if head.eq_ignore_ascii_case(AGENT_IDENTIFIER) => {}
        _ => return Err(DecodeError::malformed(node.position, "expected agent-identifier")),
    }

    let mut name = None;
    let mut addresses = Vec::new();
    let mut resolvers = Vec::new();
    let mut params = Vec::new();

    let mut rest = items[1..].iter();
    while let Some(key) = rest.next() {
        let Some(keyword) = keyword_name(key) else {
            return Err(DecodeError::malformed(key.position, "expected agent-identifier keyword"));
        };
        let Some(value) = rest.next() else {
            return Err(DecodeError::truncated(
                key.position,
                format!("missing value for :{}", keyword),
            ));
        };

        match keyword.to_ascii_lowercase().as_str() {
            "name" => name = Some(text(value, strict)?),
            "addresses" => {
                for address in sequence(value)? {
                    addresses.push(text(address, strict)?);
                }
            }
            "resolvers" => {
                for resolver in sequence(value)? {
                    resolvers.push(agent_id(resolver, strict)?);
                }
            }
            lower if lower.starts_with("x-") => {
                let param_name = user_defined_name(key, strict)?;
                params.push(UserDefinedParameter::new(param_name, text(value, strict)?));
            }
            _ if strict => {
                return Err(DecodeError::malformed(
                    key.position,
                    format!("unknown agent-identifier parameter :{}", keyword),
                ));
            }
            _ => warn!(parameter = %keyword, "Skipping unknown agent-identifier parameter"),
        }
    }

    let name = name.ok_or_else(|| {
        DecodeError::malformed(node.position, "agent-identifier without :name")
    })?;
    let mut agent = AgentId::new(name);
    agent.addresses = addresses;
    agent.resolvers = resolvers;
    agent.params = params;
    Ok(agent)
}

fn agent_set(node: &Node, strict: bool) -> Result<Vec<AgentId>, DecodeError> {
    sequence(node)?
        .iter()
        .map(|item| agent_id(item, strict))
        .collect()
}

/// Elements of a `(set ...)` or `(sequence ...)` list.
fn sequence(node: &Node) -> Result<&[Node], DecodeError> {
    if let Expr::List(items) = &node.expr {
        if let Some(Node {
            expr: Expr::Word(head),
            ..
        }) = items.first()
        {
            if head.eq_ignore_ascii_case(b"set") || head.eq_ignore_ascii_case(b"sequence") {
                return Ok(&items[1..]);
            }
        }
    }
    Err(DecodeError::malformed(node.position, "expected set or sequence"))
}

/// Parameter name of a `:keyword` word.
fn keyword_name(node: &Node) -> Option<String> {
    match &node.expr {
        Expr::Word(word) if word.len() > 1 && word[0] == b':' => {
            Some(String::from_utf8_lossy(&word[1..]).into_owned())
        }
        _ => None,
    }
}

/// Name of a `:X-name` keyword with `%XX` escapes resolved.
fn user_defined_name(key: &Node, strict: bool) -> Result<String, DecodeError> {
    let Expr::Word(word) = &key.expr else {
        return Err(DecodeError::malformed(key.position, "expected parameter keyword"));
    };
    let raw = word.get(1 + USER_DEFINED_PREFIX.len()..).unwrap_or_default();
    let name = unescape_name(raw);
    if strict {
        String::from_utf8(name)
            .map_err(|_| DecodeError::malformed(key.position, "parameter name is not valid UTF-8"))
    } else {
        Ok(String::from_utf8_lossy(&name).into_owned())
    }
}

fn raw_bytes(node: &Node) -> Result<&[u8], DecodeError> {
    match &node.expr {
        Expr::Word(bytes) | Expr::Str(bytes) => Ok(bytes),
        Expr::List(_) => Err(DecodeError::malformed(
            node.position,
            "expected word or string, found list",
        )),
    }
}

fn text(node: &Node, strict: bool) -> Result<String, DecodeError> {
    let bytes = raw_bytes(node)?;
    if strict {
        String::from_utf8(bytes.to_vec())
            .map_err(|_| DecodeError::malformed(node.position, "text is not valid UTF-8"))
    } else {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DecodeErrorKind;
    use crate::codec::datetime::from_fields;

    fn decode_str(input: &str, strict: bool) -> Result<AclMessage, DecodeError> {
        StringCodec.decode(input.as_bytes(), strict)
    }

    #[test]
    fn test_encode_layout() {
        let msg = AclMessage::new(Performative::Inform)
            .with_sender(AgentId::new("alice"))
            .with_content("hello world")
            .with_language("fipa-sl");

        let encoded = String::from_utf8(StringCodec.encode(&msg)).unwrap();
        assert_eq!(
            encoded,
            "(inform :sender (agent-identifier :name alice) :content \"hello world\" :language fipa-sl)"
        );
    }

    #[test]
    fn test_message_roundtrip() {
        let mut receiver = AgentId::new("crex_0_CREXCORE").with_address("tcp://host:7000");
        receiver.add_resolver(AgentId::new("resolver0").with_param("zone", "north"));

        let mut msg = AclMessage::new(Performative::Request)
            .with_sender(AgentId::new("proxy"))
            .with_receiver(receiver)
            .with_receiver(AgentId::new("second receiver"))
            .with_protocol("RIMRES")
            .with_language("test language")
            .with_ontology("test ontology")
            .with_reply_with("test reply_with")
            .with_in_reply_to("previous")
            .with_conversation_id("test conversationID")
            .with_content("(price \"apple\" 10) \\ done")
            .with_reply_by(from_fields(2010, 12, 23, 12, 0, 37, 5).unwrap())
            .unwrap()
            .with_param("priority", "very high");
        msg.set_encoding("utf-8");
        msg.add_reply_to(AgentId::new("proxy"));

        let encoded = StringCodec.encode(&msg);
        let text = String::from_utf8(encoded.clone()).unwrap();
        assert!(text.contains(":reply-by 20101223T120037005"));
        assert!(text.contains(":X-priority \"very high\""));

        assert_eq!(StringCodec.decode(&encoded, true).unwrap(), msg);
    }

    #[test]
    fn test_binary_content() {
        let content = vec![0xFF, 0x00, b'(', b'"', 0xFE];
        let msg = AclMessage::new(Performative::Inform).with_content(content.clone());

        let encoded = StringCodec.encode(&msg);
        let marker = b":content #5\"";
        assert!(encoded.windows(marker.len()).any(|w| w == marker));

        let decoded = StringCodec.decode(&encoded, true).unwrap();
        assert_eq!(decoded.content(), content.as_slice());
    }

    #[test]
    fn test_keywords_case_insensitive() {
        let msg = decode_str(
            "(INFORM :SENDER (Agent-Identifier :Name alice :ADDRESSES (SEQUENCE http://a)) :Content \"x\")",
            true,
        )
        .unwrap();
        assert_eq!(msg.performative(), &Performative::Inform);
        assert_eq!(msg.sender().unwrap().name(), "alice");
        assert_eq!(msg.sender().unwrap().addresses(), ["http://a".to_string()]);
        assert_eq!(msg.content_str(), Some("x"));
    }

    #[test]
    fn test_user_defined_prefix_stripped_once() {
        let msg = decode_str("(inform :X-X-foo bar :x-level 3)", true).unwrap();
        let params = msg.user_defined_parameters();
        assert_eq!(params[0].name(), "X-foo");
        assert_eq!(params[0].value(), "bar");
        assert_eq!(params[1].name(), "level");
    }

    #[test]
    fn test_user_defined_names_escaped() {
        let mut sender = AgentId::new("a");
        sender.params.push(UserDefinedParameter::new("k)", "v"));
        let msg = AclMessage::new(Performative::Inform)
            .with_sender(sender)
            .with_param("my param", "1")
            .with_param("100%", "2")
            .with_param("", "3");

        let encoded = StringCodec.encode(&msg);
        let text = String::from_utf8(encoded.clone()).unwrap();
        assert!(text.contains(":X-my%20param 1"));
        assert!(text.contains(":X-k%29 v"));
        assert!(text.contains(":X-100%25 2"));
        assert_eq!(StringCodec.decode(&encoded, true).unwrap(), msg);
    }

    #[test]
    fn test_user_defined_name_cannot_inject_fields() {
        let msg = AclMessage::new(Performative::Inform)
            .with_conversation_id("real")
            .with_param("p x :conversation-id hijacked", "v");

        let encoded = StringCodec.encode(&msg);
        for strict in [true, false] {
            let decoded = StringCodec.decode(&encoded, strict).unwrap();
            assert_eq!(decoded.conversation_id(), "real");
            assert_eq!(
                decoded.user_defined_parameters()[0].name(),
                "p x :conversation-id hijacked"
            );
        }
    }

    #[test]
    fn test_unescaped_percent_kept() {
        let msg = decode_str("(inform :X-50%off yes :X-a%2 b)", true).unwrap();
        let params = msg.user_defined_parameters();
        assert_eq!(params[0].name(), "50%off");
        assert_eq!(params[1].name(), "a%2");
    }

    #[test]
    fn test_escaped_string() {
        let msg = decode_str(r#"(inform :content "a\"b\\c")"#, true).unwrap();
        assert_eq!(msg.content(), br#"a"b\c"#);
    }

    #[test]
    fn test_unknown_parameter() {
        let input = "(inform :sender (agent-identifier :name a) :colour blue :protocol fipa-request)";

        let err = decode_str(input, true).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::MalformedStructure);

        let msg = decode_str(input, false).unwrap();
        assert_eq!(msg.sender().unwrap().name(), "a");
        assert_eq!(msg.protocol(), "fipa-request");
    }

    #[test]
    fn test_unclosed_list() {
        let input = "(inform :sender (agent-identifier :name a";

        let err = decode_str(input, true).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::TruncatedInput);

        let msg = decode_str(input, false).unwrap();
        assert_eq!(msg.sender().unwrap().name(), "a");
    }

    #[test]
    fn test_trailing_bytes() {
        let err = decode_str("(agree) junk", true).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::MalformedStructure);
        assert_eq!(decode_str("(agree) junk", false).unwrap().performative(), &Performative::Agree);
    }

    #[test]
    fn test_bad_reply_by() {
        let input = "(inform :reply-by tomorrow :ontology o)";

        let err = decode_str(input, true).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::BadTimestamp);

        let msg = decode_str(input, false).unwrap();
        assert!(msg.reply_by().is_none());
        assert_eq!(msg.ontology(), "o");
    }

    #[test]
    fn test_unknown_performative() {
        for strict in [true, false] {
            let err = decode_str("(shout :content \"x\")", strict).unwrap_err();
            assert_eq!(err.kind, DecodeErrorKind::UnknownPerformative);
        }
        let err = decode_str("()", false).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::UnknownPerformative);

        let options = DecodeOptions::strict().with_unrecognized_performatives();
        let msg = StringCodec.decode_with(b"(shout :content \"x\")", options).unwrap();
        assert_eq!(msg.performative(), &Performative::Unrecognized("shout".into()));
    }

    #[test]
    fn test_nesting_bounded() {
        let input = format!("(inform :content {})", "(".repeat(MAX_NESTING_DEPTH + 4));
        let err = decode_str(&input, false).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::MalformedStructure);
    }

    #[test]
    fn test_agent_without_name() {
        let input = "(inform :sender (agent-identifier :addresses (sequence a)) :language sl)";
        let err = decode_str(input, true).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::MalformedStructure);

        let msg = decode_str(input, false).unwrap();
        assert!(msg.sender().is_none());
        assert_eq!(msg.language(), "sl");
    }
}
