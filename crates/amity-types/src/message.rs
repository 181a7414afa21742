//! Message domain types.
//!
//! A `Message` is immutable once persisted. In memory its `content` is
//! plaintext; at rest it is a base64 cipher envelope produced by the codec
//! in `amity-infra`. The only mutation the store permits is truncation of
//! a conversation's tail (the edit/regenerate flow).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who authored a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorRole {
    Human,
    Assistant,
}

impl fmt::Display for AuthorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthorRole::Human => write!(f, "human"),
            AuthorRole::Assistant => write!(f, "assistant"),
        }
    }
}

impl FromStr for AuthorRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(AuthorRole::Human),
            "assistant" => Ok(AuthorRole::Assistant),
            other => Err(format!("invalid author role: '{other}'")),
        }
    }
}

/// A single message within a conversation.
///
/// `id` is a UUIDv7, so ids sort by creation time. `content` is plaintext
/// here; the persistence layer encrypts before writing and decrypts (or
/// substitutes the sentinel) when reading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: AuthorRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Construct a new message with a fresh UUIDv7 id and the current time.
    pub fn new(conversation_id: Uuid, role: AuthorRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            conversation_id,
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}
