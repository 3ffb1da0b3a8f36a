// conversation.rs - Conversation Tracking

//! A single conversation: the ordered messages sharing one conversation id,
//! validated against the grammar of the conversation's protocol.
//!
//! ```text
//!  NoMessages --update--> InProgress --update (terminal states)--> Ended
//! ```
//!
//! Protocols the grammar cannot resolve are tracked without validation.
//! When the protocol or resource directory changes, the recorded messages
//! are replayed through the new grammar. If they do not fit it, the
//! conversation carries on unvalidated until the next change.

use crate::acl_message::{AclMessage, AgentId, Performative};
use crate::observability::{self, RejectionReason};
use crate::protocol::{
    ProtocolGrammar, RoleBindings, StateMachine, StateSet, StepError, default_grammar,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Conversation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversationError {
    #[error("Message for conversation '{found}' delivered to conversation '{expected}'")]
    ConversationMismatch { expected: String, found: String },

    #[error("Performative '{performative}' is not legal in protocol '{protocol}' here, expected one of {expected:?}")]
    IllegalProtocolTransition {
        protocol: String,
        performative: Performative,
        expected: Vec<Performative>,
    },

    #[error("Agent '{agent}' does not play role '{role}' in protocol '{protocol}'")]
    RoleViolation {
        protocol: String,
        role: String,
        agent: String,
    },

    #[error("No earlier message in the conversation has reply-with '{in_reply_to}'")]
    UnknownInReplyTo { in_reply_to: String },

    #[error("Conversation has no messages")]
    EmptyHistory,

    #[error("Missing conversation ID")]
    MissingConversationId,
}

/// Lifecycle of a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationStatus {
    NoMessages,
    InProgress,
    Ended,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::NoMessages => "no_messages",
            ConversationStatus::InProgress => "in_progress",
            ConversationStatus::Ended => "ended",
        }
    }
}

/// Where the recorded messages stand against the current grammar
#[derive(Debug, Clone, Default)]
enum Validation {
    /// Not checked yet; the history is replayed once a grammar resolves
    #[default]
    Pending,
    Tracking {
        states: StateSet,
        roles: RoleBindings,
    },
    /// The history does not fit the grammar; messages are taken unchecked
    Diverged,
}

#[derive(Debug, Default)]
struct ConversationState {
    topic: Option<String>,
    protocol: String,
    content_language: String,
    protocol_resource_dir: Option<PathBuf>,
    messages: Vec<AclMessage>,
    validation: Validation,
    ended: bool,
}

impl ConversationState {
    fn invalidate(&mut self) {
        self.validation = Validation::Pending;
        self.ended = false;
    }

    fn append(&mut self, message: &AclMessage, validated: bool) {
        self.messages.push(message.clone());
        observability::record_message_appended(validated);
    }
}

/// Empty `in-reply-to` always passes; otherwise some earlier message must
/// carry it as `reply-with`.
fn check_in_reply_to(message: &AclMessage, history: &[AclMessage]) -> Result<(), ConversationError> {
    let in_reply_to = message.in_reply_to();
    if in_reply_to.is_empty() || history.iter().any(|m| m.reply_with() == in_reply_to) {
        Ok(())
    } else {
        Err(ConversationError::UnknownInReplyTo {
            in_reply_to: in_reply_to.to_string(),
        })
    }
}

/// Run `messages` through `machine` from its start states. On failure
/// returns the index of the first message that does not fit.
fn replay(machine: &StateMachine, messages: &[AclMessage]) -> Result<(StateSet, RoleBindings), usize> {
    let mut states = machine.start_states();
    let mut roles = RoleBindings::new();
    for (idx, message) in messages.iter().enumerate() {
        states = machine
            .advance(&states, message, &mut roles)
            .map_err(|_| idx)?;
        check_in_reply_to(message, &messages[..idx]).map_err(|_| idx)?;
    }
    Ok((states, roles))
}

/// Conversation between the owning agent and its peers
pub struct Conversation {
    id: String,
    owner: AgentId,
    grammar: Arc<dyn ProtocolGrammar>,
    started_at: DateTime<Utc>,
    state: RwLock<ConversationState>,
}

impl Conversation {
    /// Create a conversation with a fresh id and the default grammar
    pub fn new(owner: AgentId) -> Self {
        Self::with_grammar(owner, default_grammar())
    }

    pub fn with_grammar(owner: AgentId, grammar: Arc<dyn ProtocolGrammar>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), owner, grammar)
    }

    pub(crate) fn with_id(
        id: impl Into<String>,
        owner: AgentId,
        grammar: Arc<dyn ProtocolGrammar>,
    ) -> Self {
        Self {
            id: id.into(),
            owner,
            grammar,
            started_at: Utc::now(),
            state: RwLock::new(ConversationState::default()),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.id
    }

    pub fn owner(&self) -> &AgentId {
        &self.owner
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn topic(&self) -> Option<String> {
        self.state.read().topic.clone()
    }

    pub fn set_topic(&self, topic: impl Into<String>) {
        self.state.write().topic = Some(topic.into());
    }

    pub fn protocol(&self) -> String {
        self.state.read().protocol.clone()
    }

    /// Set the protocol and replay the recorded messages through its
    /// grammar. Nothing already recorded is rejected.
    pub fn set_protocol(&self, protocol: impl Into<String>) {
        let mut state = self.state.write();
        state.protocol = protocol.into();
        self.revalidate(&mut state);
    }

    pub fn content_language(&self) -> String {
        self.state.read().content_language.clone()
    }

    pub fn set_content_language(&self, language: impl Into<String>) {
        self.state.write().content_language = language.into();
    }

    pub fn protocol_resource_dir(&self) -> Option<PathBuf> {
        self.state.read().protocol_resource_dir.clone()
    }

    /// Set where grammars are looked up, replaying the recorded messages
    /// as [`set_protocol`](Self::set_protocol) does.
    pub fn set_protocol_resource_dir(&self, dir: impl Into<PathBuf>) {
        let mut state = self.state.write();
        state.protocol_resource_dir = Some(dir.into());
        self.revalidate(&mut state);
    }

    /// Record a message, checking it against the protocol grammar when one
    /// can be resolved.
    pub fn update(&self, message: &AclMessage) -> Result<(), ConversationError> {
        if message.conversation_id() != self.id {
            return Err(ConversationError::ConversationMismatch {
                expected: self.id.clone(),
                found: message.conversation_id().to_string(),
            });
        }

        let mut state = self.state.write();
        if state.protocol.is_empty() && !message.protocol().is_empty() {
            state.protocol = message.protocol().to_string();
            state.invalidate();
        }
        if state.content_language.is_empty() && !message.language().is_empty() {
            state.content_language = message.language().to_string();
        }

        let Some(machine) = self.resolve(&state.protocol, state.protocol_resource_dir.as_deref())
        else {
            state.append(message, false);
            debug!(
                conversation_id = %self.id,
                performative = %message.performative(),
                "Appended message without protocol validation"
            );
            return Ok(());
        };

        self.sync(&mut state, &machine);
        let Validation::Tracking { states, roles } = &state.validation else {
            state.append(message, false);
            debug!(
                conversation_id = %self.id,
                performative = %message.performative(),
                "Appended message to diverged conversation"
            );
            return Ok(());
        };

        let mut roles = roles.clone();
        let next = match machine.advance(states, message, &mut roles) {
            Ok(next) => next,
            Err(StepError::IllegalPerformative) => {
                return Err(self.reject(
                    &machine,
                    RejectionReason::Performative,
                    ConversationError::IllegalProtocolTransition {
                        protocol: state.protocol.clone(),
                        performative: message.performative().clone(),
                        expected: machine.expected_performatives(states),
                    },
                ));
            }
            Err(StepError::Role(violation)) => {
                return Err(self.reject(
                    &machine,
                    RejectionReason::Role,
                    ConversationError::RoleViolation {
                        protocol: state.protocol.clone(),
                        role: violation.role,
                        agent: violation.agent,
                    },
                ));
            }
        };
        if let Err(err) = check_in_reply_to(message, &state.messages) {
            return Err(self.reject(&machine, RejectionReason::InReplyTo, err));
        }

        state.ended = machine.is_terminal(&next);
        state.validation = Validation::Tracking { states: next, roles };
        state.append(message, true);
        debug!(
            conversation_id = %self.id,
            performative = %message.performative(),
            ended = state.ended,
            "Appended message"
        );
        Ok(())
    }

    pub fn has_ended(&self) -> bool {
        self.state.read().ended
    }

    pub fn has_messages(&self) -> bool {
        !self.state.read().messages.is_empty()
    }

    pub fn status(&self) -> ConversationStatus {
        let state = self.state.read();
        if state.ended {
            ConversationStatus::Ended
        } else if state.messages.is_empty() {
            ConversationStatus::NoMessages
        } else {
            ConversationStatus::InProgress
        }
    }

    pub fn last_message(&self) -> Result<AclMessage, ConversationError> {
        self.state
            .read()
            .messages
            .last()
            .cloned()
            .ok_or(ConversationError::EmptyHistory)
    }

    /// Snapshot of the recorded messages
    pub fn messages(&self) -> Vec<AclMessage> {
        self.state.read().messages.clone()
    }

    pub fn message_count(&self) -> usize {
        self.state.read().messages.len()
    }

    /// Performatives the grammar accepts next; empty without a grammar or
    /// once the history has diverged from it.
    pub fn expected_performatives(&self) -> Vec<Performative> {
        let mut state = self.state.write();
        let Some(machine) = self.resolve(&state.protocol, state.protocol_resource_dir.as_deref())
        else {
            return Vec::new();
        };
        self.sync(&mut state, &machine);
        match &state.validation {
            Validation::Tracking { states, .. } => machine.expected_performatives(states),
            _ => Vec::new(),
        }
    }

    /// Whether messages are currently checked against a grammar
    pub fn is_validating(&self) -> bool {
        matches!(self.state.read().validation, Validation::Tracking { .. })
    }

    /// Agents bound to `role` so far
    pub fn role_agents(&self, role: &str) -> Option<Vec<String>> {
        match &self.state.read().validation {
            Validation::Tracking { roles, .. } => roles.agents(role).map(<[String]>::to_vec),
            _ => None,
        }
    }

    fn revalidate(&self, state: &mut ConversationState) {
        state.invalidate();
        if let Some(machine) = self.resolve(&state.protocol, state.protocol_resource_dir.as_deref()) {
            self.sync(state, &machine);
        }
    }

    /// Replay the history if it has not been checked against `machine` yet
    fn sync(&self, state: &mut ConversationState, machine: &StateMachine) {
        if !matches!(state.validation, Validation::Pending) {
            return;
        }
        match replay(machine, &state.messages) {
            Ok((states, roles)) => {
                state.ended = !state.messages.is_empty() && machine.is_terminal(&states);
                state.validation = Validation::Tracking { states, roles };
            }
            Err(index) => {
                warn!(
                    conversation_id = %self.id,
                    grammar = %machine.name(),
                    message_index = index,
                    "Recorded messages do not fit the protocol grammar, continuing without validation"
                );
                state.ended = false;
                state.validation = Validation::Diverged;
            }
        }
    }

    fn reject(
        &self,
        machine: &StateMachine,
        reason: RejectionReason,
        err: ConversationError,
    ) -> ConversationError {
        warn!(conversation_id = %self.id, grammar = %machine.name(), error = %err, "Rejected message");
        observability::record_transition_rejected(machine.name(), reason);
        err
    }

    fn resolve(&self, protocol: &str, resource_dir: Option<&Path>) -> Option<Arc<StateMachine>> {
        if protocol.is_empty() {
            return None;
        }
        self.grammar.resolve(protocol, resource_dir?)
    }
}

impl std::fmt::Debug for Conversation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Conversation")
            .field("id", &self.id)
            .field("owner", &self.owner.name)
            .field("protocol", &state.protocol)
            .field("messages", &state.messages.len())
            .field("ended", &state.ended)
            .finish()
    }
}
