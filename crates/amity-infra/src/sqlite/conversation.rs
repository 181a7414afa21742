//! Conversation CRUD for `SqliteMessageStore`.
//!
//! Conversations themselves are metadata (owner, participant tags, style);
//! only message content is encrypted.

use amity_core::store::ConversationStore;
use amity_types::conversation::{Conversation, ReplyLength, StyleParameters, Tone, Voice};
use amity_types::error::RepositoryError;
use sqlx::Row;
use uuid::Uuid;

use super::message::SqliteMessageStore;
use super::{map_sqlx, parse_datetime};

struct ConversationRow {
    id: String,
    account_id: String,
    participant_context: String,
    tone: String,
    length: String,
    voice: String,
    created_at: String,
}

impl ConversationRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            participant_context: row.try_get("participant_context")?,
            tone: row.try_get("tone")?,
            length: row.try_get("length")?,
            voice: row.try_get("voice")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_conversation(self) -> Result<Conversation, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid conversation id: {e}")))?;
        let account_id = Uuid::parse_str(&self.account_id)
            .map_err(|e| RepositoryError::Query(format!("invalid account_id: {e}")))?;
        let participant_context: Vec<String> = serde_json::from_str(&self.participant_context)
            .map_err(|e| RepositoryError::Query(format!("invalid participant_context: {e}")))?;
        let tone: Tone = self
            .tone
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;
        let length: ReplyLength = self
            .length
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;
        let voice: Voice = self
            .voice
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;
        let created_at = parse_datetime(&self.created_at)?;

        Ok(Conversation {
            id,
            account_id,
            participant_context,
            style: StyleParameters { tone, length, voice },
            created_at,
        })
    }
}

impl ConversationStore for SqliteMessageStore {
    async fn create_conversation(
        &self,
        conversation: &Conversation,
    ) -> Result<(), RepositoryError> {
        let participant_context = serde_json::to_string(&conversation.participant_context)
            .map_err(|e| RepositoryError::Query(format!("invalid participant_context: {e}")))?;

        sqlx::query(
            "INSERT INTO conversations (id, account_id, participant_context, tone, length, voice, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(conversation.id.to_string())
        .bind(conversation.account_id.to_string())
        .bind(participant_context)
        .bind(conversation.style.tone.to_string())
        .bind(conversation.style.length.to_string())
        .bind(conversation.style.voice.to_string())
        .bind(conversation.created_at.to_rfc3339())
        .execute(&self.pool().writer)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                RepositoryError::Conflict(format!("conversation {} exists", conversation.id))
            }
            other => map_sqlx(other),
        })?;

        Ok(())
    }

    async fn get_conversation(&self, id: &Uuid) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, account_id, participant_context, tone, length, voice, created_at
             FROM conversations WHERE id = ?1",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool().reader)
        .await
        .map_err(map_sqlx)?;

        row.map(|r| ConversationRow::from_row(&r).map_err(map_sqlx)?.into_conversation())
            .transpose()
    }

    async fn list_conversations(
        &self,
        account_id: &Uuid,
    ) -> Result<Vec<Conversation>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, account_id, participant_context, tone, length, voice, created_at
             FROM conversations WHERE account_id = ?1
             ORDER BY created_at DESC, id DESC",
        )
        .bind(account_id.to_string())
        .fetch_all(&self.pool().reader)
        .await
        .map_err(map_sqlx)?;

        rows.iter()
            .map(|row| {
                ConversationRow::from_row(row)
                    .map_err(map_sqlx)
                    .and_then(|r| r.into_conversation())
            })
            .collect()
    }
}
