//! SQLite message store with encryption at rest.
//!
//! Implements `MessageStore` from `amity-core` using sqlx with the split
//! read/write pool. Content is encrypted through [`MessageCodec`] before
//! every insert; reads decrypt each row independently, so a single
//! corrupted envelope degrades to sentinel text without aborting the rest
//! of the history.

use amity_core::store::MessageStore;
use amity_types::error::RepositoryError;
use amity_types::message::{AuthorRole, Message};
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use crate::crypto::MessageCodec;

use super::pool::DatabasePool;
use super::{map_sqlx, parse_datetime};

/// SQLite-backed, encrypted implementation of `MessageStore`.
pub struct SqliteMessageStore {
    pool: DatabasePool,
    codec: MessageCodec,
}

impl SqliteMessageStore {
    pub fn new(pool: DatabasePool, codec: MessageCodec) -> Self {
        Self { pool, codec }
    }

    pub(crate) fn pool(&self) -> &DatabasePool {
        &self.pool
    }
}

// ---------------------------------------------------------------------------
// Private Row type for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct MessageRow {
    id: String,
    conversation_id: String,
    role: String,
    content: String,
    created_at: String,
}

impl MessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            conversation_id: row.try_get("conversation_id")?,
            role: row.try_get("role")?,
            content: row.try_get("content")?,
            created_at: row.try_get("created_at")?,
        })
    }

    /// Map into a domain message, decrypting the stored envelope. Decrypt
    /// failures surface as sentinel text, never as an error.
    fn into_message(self, codec: &MessageCodec) -> Result<Message, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid message id: {e}")))?;
        let conversation_id = Uuid::parse_str(&self.conversation_id)
            .map_err(|e| RepositoryError::Query(format!("invalid conversation_id: {e}")))?;
        let role: AuthorRole = self
            .role
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;
        let created_at = parse_datetime(&self.created_at)?;
        let content = codec.decrypt_or_sentinel(&self.content);

        Ok(Message {
            id,
            conversation_id,
            role,
            content,
            created_at,
        })
    }
}

impl MessageStore for SqliteMessageStore {
    /// Encrypt and insert one message. The returned `Message` carries the
    /// original plaintext; nothing is re-decrypted on this path.
    async fn store(
        &self,
        conversation_id: Uuid,
        content: &str,
        role: AuthorRole,
    ) -> Result<Message, RepositoryError> {
        let id = Uuid::now_v7();
        let created_at = Utc::now();
        let envelope = self
            .codec
            .encrypt(content)
            .map_err(|e| RepositoryError::Query(format!("content encryption failed: {e}")))?;

        sqlx::query(
            "INSERT INTO messages (id, conversation_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(id.to_string())
        .bind(conversation_id.to_string())
        .bind(role.to_string())
        .bind(&envelope)
        .bind(created_at.to_rfc3339())
        .execute(&self.pool.writer)
        .await
        .map_err(map_sqlx)?;

        Ok(Message {
            id,
            conversation_id,
            role,
            content: content.to_string(),
            created_at,
        })
    }

    async fn fetch_all(&self, conversation_id: Uuid) -> Result<Vec<Message>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, conversation_id, role, content, created_at
             FROM messages
             WHERE conversation_id = ?1
             ORDER BY created_at ASC, id ASC",
        )
        .bind(conversation_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(map_sqlx)?;

        rows.iter()
            .map(|row| {
                MessageRow::from_row(row)
                    .map_err(map_sqlx)
                    .and_then(|r| r.into_message(&self.codec))
            })
            .collect()
    }

    /// Delete the given message and every later one in the conversation.
    /// UUIDv7 ids sort by creation time, so the tail is an id-range delete.
    async fn truncate_from(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "DELETE FROM messages WHERE conversation_id = ?1 AND id >= ?2",
        )
        .bind(conversation_id.to_string())
        .bind(message_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(map_sqlx)?;

        Ok(result.rows_affected())
    }
}
