// codec/mod.rs - ACL Message Codecs
//
//! Codec interface for encoding and decoding ACL messages
//!
//! Two representations are supported:
//!
//! - [`BitefficientCodec`] - the compact binary form of FIPA SC00069
//! - [`StringCodec`] - the keyword-tagged textual form of FIPA SC00070
//!
//! [`decode`] sniffs the representation from the first significant byte, so
//! callers holding bytes of unknown origin do not need to know which one was
//! used.
//!
//! [`encode_envelope`] and [`decode_envelope`] wrap an encoded message in a
//! bit-efficient transport envelope.
//!
//! # Example
//!
//! ```ignore
//! use fipa_acl::codec::{self, Representation};
//!
//! let bytes = codec::encode(&msg, Representation::Bitefficient);
//! let decoded = codec::decode(&bytes, true)?;
//! assert_eq!(decoded, msg);
//! ```

mod bitefficient;
pub mod datetime;
mod envelope;
mod string;

pub use bitefficient::BitefficientCodec;
pub use envelope::{decode_envelope, encode_envelope};
pub use string::StringCodec;

use crate::acl_message::AclMessage;
use crate::observability;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Maximum nesting of agent identifiers (resolvers of resolvers) and of
/// string form lists accepted by the decoders.
pub const MAX_NESTING_DEPTH: usize = 16;

/// Why a decode failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeErrorKind {
    /// Performative keyword or code is not a FIPA communicative act
    UnknownPerformative,
    /// Unexpected token, unknown parameter, or unsupported construct
    MalformedStructure,
    /// Input ended before the message was complete
    TruncatedInput,
    /// A reply-by value that is not a valid absolute DateTime
    BadTimestamp,
}

impl DecodeErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecodeErrorKind::UnknownPerformative => "unknown_performative",
            DecodeErrorKind::MalformedStructure => "malformed_structure",
            DecodeErrorKind::TruncatedInput => "truncated_input",
            DecodeErrorKind::BadTimestamp => "bad_timestamp",
        }
    }
}

impl fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decode error carrying its cause tag and the byte offset it was detected at
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at byte {position}: {message}")]
pub struct DecodeError {
    pub kind: DecodeErrorKind,
    pub position: usize,
    pub message: String,
}

impl DecodeError {
    pub fn new(kind: DecodeErrorKind, position: usize, message: impl Into<String>) -> Self {
        Self {
            kind,
            position,
            message: message.into(),
        }
    }

    pub fn unknown_performative(position: usize, text: &str) -> Self {
        Self::new(
            DecodeErrorKind::UnknownPerformative,
            position,
            format!("unknown performative '{}'", text),
        )
    }

    pub fn malformed(position: usize, message: impl Into<String>) -> Self {
        Self::new(DecodeErrorKind::MalformedStructure, position, message)
    }

    pub fn truncated(position: usize, message: impl Into<String>) -> Self {
        Self::new(DecodeErrorKind::TruncatedInput, position, message)
    }

    pub fn bad_timestamp(position: usize, message: impl Into<String>) -> Self {
        Self::new(DecodeErrorKind::BadTimestamp, position, message)
    }
}

/// Wire representation of an ACL message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Representation {
    #[default]
    Bitefficient,
    String,
}

impl Representation {
    /// Representation name as used in FIPA message envelopes.
    pub fn as_str(&self) -> &'static str {
        match self {
            Representation::Bitefficient => "fipa.acl.rep.bitefficient.std",
            Representation::String => "fipa.acl.rep.string.std",
        }
    }

    /// Guess the representation from the first significant byte.
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        match bytes.iter().find(|b| !b.is_ascii_whitespace())? {
            0xFA..=0xFC => Some(Representation::Bitefficient),
            b'(' => Some(Representation::String),
            _ => None,
        }
    }
}

impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoder behavior switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Fail on any unparseable field instead of dropping optional ones
    pub strict: bool,
    /// Keep unknown performatives as `Performative::Unrecognized`
    pub allow_unrecognized_performative: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self::strict()
    }
}

impl DecodeOptions {
    pub fn strict() -> Self {
        Self {
            strict: true,
            allow_unrecognized_performative: false,
        }
    }

    pub fn lenient() -> Self {
        Self {
            strict: false,
            allow_unrecognized_performative: false,
        }
    }

    pub fn with_unrecognized_performatives(mut self) -> Self {
        self.allow_unrecognized_performative = true;
        self
    }
}

/// Codec trait for encoding/decoding ACL messages
pub trait MessageCodec: Send + Sync {
    /// Get the representation this codec produces
    fn representation(&self) -> Representation;

    /// Encode a message. Total over every constructible message.
    fn encode(&self, msg: &AclMessage) -> Vec<u8>;

    /// Decode bytes with explicit options
    fn decode_with(&self, bytes: &[u8], options: DecodeOptions) -> Result<AclMessage, DecodeError>;

    /// Decode bytes, failing on anything unparseable when `strict` is set
    fn decode(&self, bytes: &[u8], strict: bool) -> Result<AclMessage, DecodeError> {
        let options = DecodeOptions {
            strict,
            ..DecodeOptions::default()
        };
        self.decode_with(bytes, options)
    }
}

/// Get the codec for a representation
pub fn codec_for(representation: Representation) -> &'static dyn MessageCodec {
    match representation {
        Representation::Bitefficient => &BitefficientCodec,
        Representation::String => &StringCodec,
    }
}

/// Encode a message in the given representation
pub fn encode(msg: &AclMessage, representation: Representation) -> Vec<u8> {
    let bytes = codec_for(representation).encode(msg);
    observability::record_message_encoded(representation, bytes.len());
    bytes
}

/// Decode a message in either representation
pub fn decode(bytes: &[u8], strict: bool) -> Result<AclMessage, DecodeError> {
    let options = DecodeOptions {
        strict,
        ..DecodeOptions::default()
    };
    decode_with(bytes, options)
}

/// Decode a message in either representation with explicit options
pub fn decode_with(bytes: &[u8], options: DecodeOptions) -> Result<AclMessage, DecodeError> {
    let Some(representation) = Representation::detect(bytes) else {
        let err = if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            DecodeError::truncated(bytes.len(), "empty input")
        } else {
            DecodeError::malformed(0, "input is neither bit-efficient nor string ACL")
        };
        observability::record_decode_failure(None, err.kind);
        return Err(err);
    };

    let result = codec_for(representation).decode_with(bytes, options);
    match &result {
        Ok(_) => observability::record_message_decoded(representation),
        Err(err) => {
            tracing::debug!(
                representation = %representation,
                kind = %err.kind,
                position = err.position,
                "ACL decode failed"
            );
            observability::record_decode_failure(Some(representation), err.kind);
        }
    }
    result
}

/// Whether `s` is a FIPA `Word`: no control characters, whitespace or
/// parentheses, not starting with `#`, a digit, `-`, `@` or `"`.
pub(crate) fn is_fipa_word(s: &str) -> bool {
    let bytes = s.as_bytes();
    let Some(first) = bytes.first() else {
        return false;
    };
    if matches!(first, b'#' | b'0'..=b'9' | b'-' | b'@' | b'"' | b':') {
        return false;
    }
    bytes
        .iter()
        .all(|b| *b > 0x20 && !matches!(b, b'(' | b')' | b'"' | 0x7F))
}
