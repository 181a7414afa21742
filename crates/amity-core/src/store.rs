//! Persistence ports for messages and conversations.
//!
//! Implementations live in `amity-infra` (e.g. `SqliteMessageStore`).
//! Uses native async fn in traits (RPITIT, Rust 2024 edition).

use uuid::Uuid;

use amity_types::conversation::Conversation;
use amity_types::error::RepositoryError;
use amity_types::message::{AuthorRole, Message};

/// Durable, encrypted message storage keyed by conversation.
///
/// `store` encrypts before writing and returns the message with its
/// original plaintext. `fetch_all` is a full ordered read in which a
/// single undecryptable row degrades to sentinel text rather than
/// aborting retrieval.
pub trait MessageStore: Send + Sync {
    /// Persist one message, returning it with plaintext content.
    fn store(
        &self,
        conversation_id: Uuid,
        content: &str,
        role: AuthorRole,
    ) -> impl Future<Output = Result<Message, RepositoryError>> + Send;

    /// All messages of a conversation, in creation order.
    fn fetch_all(
        &self,
        conversation_id: Uuid,
    ) -> impl Future<Output = Result<Vec<Message>, RepositoryError>> + Send;

    /// Delete `message_id` and every later message in the conversation
    /// (edit/regenerate flow). Returns the number of rows removed.
    fn truncate_from(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
    ) -> impl Future<Output = Result<u64, RepositoryError>> + Send;
}

/// Conversation CRUD.
pub trait ConversationStore: Send + Sync {
    fn create_conversation(
        &self,
        conversation: &Conversation,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    fn get_conversation(
        &self,
        id: &Uuid,
    ) -> impl Future<Output = Result<Option<Conversation>, RepositoryError>> + Send;

    /// Conversations owned by an account, most recent first.
    fn list_conversations(
        &self,
        account_id: &Uuid,
    ) -> impl Future<Output = Result<Vec<Conversation>, RepositoryError>> + Send;
}
