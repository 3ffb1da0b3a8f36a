// monitor.rs - Conversation Monitor

//! Registry of the conversations an agent takes part in, keyed by
//! conversation id. Incoming and outgoing messages are routed to their
//! conversation with [`ConversationMonitor::update_conversation`].

use crate::acl_message::{AclMessage, AgentId};
use crate::config::MonitorSettings;
use crate::conversation::{Conversation, ConversationError};
use crate::observability;
use crate::protocol::{ProtocolGrammar, default_grammar};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use tracing::{debug, info};

/// Conversation registry for one agent
pub struct ConversationMonitor {
    owner: AgentId,

    /// conversation_id -> conversation
    conversations: Arc<DashMap<String, Arc<Conversation>>>,

    /// Shared by every conversation created here
    grammar: Arc<dyn ProtocolGrammar>,

    settings: MonitorSettings,
}

impl ConversationMonitor {
    /// Create a monitor with the default grammar and settings
    pub fn new(owner: AgentId) -> Self {
        Self::with_settings(owner, default_grammar(), MonitorSettings::default())
    }

    pub fn with_grammar(owner: AgentId, grammar: Arc<dyn ProtocolGrammar>) -> Self {
        Self::with_settings(owner, grammar, MonitorSettings::default())
    }

    pub fn with_settings(
        owner: AgentId,
        grammar: Arc<dyn ProtocolGrammar>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            owner,
            conversations: Arc::new(DashMap::new()),
            grammar,
            settings,
        }
    }

    pub fn owner(&self) -> &AgentId {
        &self.owner
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Register a new conversation under a fresh id
    pub fn start_conversation(&self, topic: impl Into<String>) -> Arc<Conversation> {
        let topic = topic.into();
        loop {
            let id = uuid::Uuid::new_v4().to_string();
            match self.conversations.entry(id) {
                Entry::Occupied(entry) => {
                    debug!(conversation_id = %entry.key(), "Conversation id collision, retrying");
                }
                Entry::Vacant(entry) => {
                    let conversation = Arc::new(self.new_conversation(entry.key()));
                    conversation.set_topic(topic.clone());
                    entry.insert(conversation.clone());

                    observability::record_conversation_started();
                    info!(
                        owner = %self.owner.name,
                        conversation_id = %conversation.conversation_id(),
                        topic = %topic,
                        "Started conversation"
                    );
                    return conversation;
                }
            }
        }
    }

    /// Conversation registered under `id`, created empty if there is none
    pub fn get_or_create_conversation(&self, id: &str) -> Arc<Conversation> {
        self.conversations
            .entry(id.to_string())
            .or_insert_with(|| {
                observability::record_conversation_started();
                debug!(owner = %self.owner.name, conversation_id = %id, "Registered conversation");
                Arc::new(self.new_conversation(id))
            })
            .value()
            .clone()
    }

    /// Route a message to its conversation and record it there.
    ///
    /// A conversation opened by this message is only registered once the
    /// message has been accepted; on error the registry is unchanged.
    pub fn update_conversation(
        &self,
        message: &AclMessage,
    ) -> Result<Arc<Conversation>, ConversationError> {
        let id = message.conversation_id();
        if id.is_empty() {
            return Err(ConversationError::MissingConversationId);
        }

        let conversation = match self.conversations.entry(id.to_string()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                // The shard stays locked until the first message is in, so
                // concurrent openers of the same id serialize here.
                let conversation = Arc::new(self.new_conversation(id));
                conversation.update(message)?;
                entry.insert(conversation.clone());

                observability::record_conversation_started();
                debug!(owner = %self.owner.name, conversation_id = %id, "Registered conversation");
                return Ok(conversation);
            }
        };
        conversation.update(message)?;
        Ok(conversation)
    }

    pub fn get_conversation(&self, id: &str) -> Option<Arc<Conversation>> {
        self.conversations.get(id).map(|entry| entry.value().clone())
    }

    /// Ids of all registered conversations, in no particular order
    pub fn get_active_conversations(&self) -> Vec<String> {
        self.conversations
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Unregister a conversation. Holders of its `Arc` keep a usable object.
    pub fn remove_conversation(&self, id: &str) -> bool {
        let removed = self.conversations.remove(id).is_some();
        if removed {
            observability::record_conversations_removed(1);
            info!(owner = %self.owner.name, conversation_id = %id, "Removed conversation");
        }
        removed
    }

    /// Unregister every conversation
    pub fn cleanup(&self) {
        let mut removed = 0;
        self.conversations.retain(|_, _| {
            removed += 1;
            false
        });
        observability::record_conversations_removed(removed);
        info!(owner = %self.owner.name, removed, "Cleaned up conversations");
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    fn new_conversation(&self, id: &str) -> Conversation {
        let conversation = Conversation::with_id(id, self.owner.clone(), self.grammar.clone());
        if let Some(dir) = &self.settings.protocol_resource_dir {
            conversation.set_protocol_resource_dir(dir.clone());
        }
        if !self.settings.default_content_language.is_empty() {
            conversation.set_content_language(self.settings.default_content_language.clone());
        }
        conversation
    }
}

impl std::fmt::Debug for ConversationMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationMonitor")
            .field("owner", &self.owner.name)
            .field("conversations", &self.conversations.len())
            .field("settings", &self.settings)
            .finish()
    }
}
