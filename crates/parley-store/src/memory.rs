//! Process-local conversation store. Contents are lost on restart.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use parley_core::{Error, Result, Role};
use tracing::debug;

use crate::types::*;
use crate::ConversationStore;

/// Conversations held in a single lock-guarded map.
#[derive(Default)]
pub struct InMemoryConversationStore {
    conversations: RwLock<HashMap<String, Conversation>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.conversations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.read().is_empty()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn create_conversation(&self) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.conversations
            .write()
            .insert(id.clone(), Conversation::new(id.clone()));
        debug!("Created conversation {}", id);
        Ok(id)
    }

    async fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        Ok(self.conversations.read().get(conversation_id).cloned())
    }

    async fn add_message(&self, conversation_id: &str, role: Role, content: &str) -> Result<()> {
        let mut conversations = self.conversations.write();
        let conversation = conversations
            .get_mut(conversation_id)
            .ok_or_else(|| Error::NotFound(format!("Conversation {} not found", conversation_id)))?;

        let message = Message::new(role, content);
        // Wall clock may step backwards; keep updated_at monotonic.
        conversation.updated_at = conversation.updated_at.max(message.timestamp);
        conversation.messages.push(message);
        Ok(())
    }

    async fn get_messages(&self, conversation_id: &str) -> Result<Vec<MessageRecord>> {
        let conversations = self.conversations.read();
        let conversation = conversations
            .get(conversation_id)
            .ok_or_else(|| Error::NotFound(format!("Conversation {} not found", conversation_id)))?;
        Ok(conversation.messages.iter().map(Message::record).collect())
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        let mut summaries: Vec<ConversationSummary> = self
            .conversations
            .read()
            .values()
            .map(Conversation::summary)
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        Ok(summaries)
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<bool> {
        let removed = self.conversations.write().remove(conversation_id).is_some();
        if removed {
            debug!("Deleted conversation {}", conversation_id);
        }
        Ok(removed)
    }
}
