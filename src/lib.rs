// lib.rs - FIPA ACL Messages and Conversation Tracking
//
// FIPA Agent Communication Language messages with bit-efficient and string
// codecs, plus conversation tracking against interaction protocol grammars.

//! # fipa-acl
//!
//! - [`AclMessage`] and [`AgentId`] model a FIPA ACL message.
//! - [`codec`] encodes and decodes the bit-efficient (SC00069) and string
//!   (SC00070) representations.
//! - [`Conversation`] groups messages sharing a conversation id and checks
//!   them against a protocol grammar.
//! - [`ConversationMonitor`] routes messages to their conversations.
//! - [`AclEnvelope`] carries an encoded message between platforms.
//!
//! ```ignore
//! use fipa_acl::prelude::*;
//!
//! let monitor = ConversationMonitor::new(AgentId::new("proxy"));
//! let msg = AclMessage::new(Performative::Request)
//!     .with_sender(AgentId::new("proxy"))
//!     .with_conversation_id("conv-1")
//!     .with_protocol("fipa-request");
//!
//! let bytes = codec::encode(&msg, Representation::Bitefficient);
//! let received = codec::decode(&bytes, true)?;
//! monitor.update_conversation(&received)?;
//! ```

pub mod acl_message;
pub mod codec;
pub mod config;
pub mod conversation;
pub mod envelope;
pub mod monitor;
pub mod observability;
pub mod protocol;

// Re-export commonly used types
pub use acl_message::{
    AclMessage, AgentId, Performative, TimestampOutOfRange, UnknownPerformative,
    UserDefinedParameter,
};

pub use codec::{
    BitefficientCodec, DecodeError, DecodeErrorKind, DecodeOptions, MessageCodec, Representation,
    StringCodec,
};

pub use conversation::{Conversation, ConversationError, ConversationStatus};

pub use envelope::{AclEnvelope, BaseEnvelope, ReceivedObject};

pub use monitor::ConversationMonitor;

pub use protocol::{
    CachedGrammar, DirectoryGrammar, GrammarError, GrammarLibrary, ProtocolGrammar, RoleBindings,
    RoleViolation, StateMachine, StateSet, StepError, default_grammar,
};

pub use observability::{
    MetricsConfig, MetricsHandle, TracingConfig, TracingFormat, init_metrics, init_tracing,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::acl_message::{AclMessage, AgentId, Performative, UserDefinedParameter};
    pub use crate::codec::{self, DecodeError, DecodeOptions, MessageCodec, Representation};
    pub use crate::config::Settings;
    pub use crate::conversation::{Conversation, ConversationError, ConversationStatus};
    pub use crate::envelope::{AclEnvelope, BaseEnvelope};
    pub use crate::monitor::ConversationMonitor;
    pub use crate::protocol::{GrammarLibrary, ProtocolGrammar, StateMachine};
}
