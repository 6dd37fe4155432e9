//! Parley Store: conversation history keyed by conversation id.

pub mod memory;
pub mod types;

use async_trait::async_trait;
use parley_core::{Result, Role};

pub use memory::InMemoryConversationStore;
pub use types::*;

/// Storage backend for conversations.
///
/// All operations on an unknown conversation id other than `get_conversation`
/// and `delete_conversation` fail with `Error::NotFound`.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create an empty conversation and return its id.
    async fn create_conversation(&self) -> Result<String>;

    async fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>>;

    /// Append a message and bump `updated_at`.
    async fn add_message(&self, conversation_id: &str, role: Role, content: &str) -> Result<()>;

    /// Messages as `{role, content}` pairs, oldest first.
    async fn get_messages(&self, conversation_id: &str) -> Result<Vec<MessageRecord>>;

    /// Summaries of all conversations, most recently updated first.
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>>;

    /// Returns whether a conversation was removed.
    async fn delete_conversation(&self, conversation_id: &str) -> Result<bool>;
}
