//! Request shapes for the generative coaching backend.
//!
//! The backend is an opaque remote service: it accepts role-tagged
//! conversation turns plus participant context and style parameters, and
//! answers with either a single text blob or a chunked event stream.

use serde::{Deserialize, Serialize};

use crate::conversation::StyleParameters;
use crate::message::{AuthorRole, Message};

/// Role tag a turn carries on the wire.
///
/// Domain messages use `human`/`assistant`; the backend expects
/// `user`/`assistant`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    User,
    Assistant,
}

impl From<AuthorRole> for PromptRole {
    fn from(role: AuthorRole) -> Self {
        match role {
            AuthorRole::Human => PromptRole::User,
            AuthorRole::Assistant => PromptRole::Assistant,
        }
    }
}

/// One turn of conversation history sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTurn {
    pub role: PromptRole,
    pub content: String,
}

impl From<&Message> for PromptTurn {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role.into(),
            content: message.content.clone(),
        }
    }
}

/// A full prompt request for one reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendRequest {
    pub history: Vec<PromptTurn>,
    pub participant_context: Vec<String>,
    pub style: StyleParameters,
}
