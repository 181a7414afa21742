//! Conversation domain types.
//!
//! A conversation is owned by exactly one account and carries the
//! participant context tags and style parameters that shape every prompt
//! built for it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A coaching conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    /// Owning account. Conversations are readable and writable only by
    /// their owner; enforcement lives in the calling layer.
    pub account_id: Uuid,
    /// Tags describing the participants (e.g. "long-distance",
    /// "new-parents") injected into prompt construction.
    pub participant_context: Vec<String>,
    pub style: StyleParameters,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Construct a new conversation with default style parameters.
    pub fn new(account_id: Uuid) -> Self {
        Self {
            id: Uuid::now_v7(),
            account_id,
            participant_context: Vec::new(),
            style: StyleParameters::default(),
            created_at: Utc::now(),
        }
    }
}

/// Tone, length, and voice knobs sent alongside every prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleParameters {
    #[serde(default)]
    pub tone: Tone,
    #[serde(default)]
    pub length: ReplyLength,
    #[serde(default)]
    pub voice: Voice,
}

/// Emotional register of generated replies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Warm,
    Direct,
    Playful,
}

/// Target reply length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyLength {
    Brief,
    #[default]
    Standard,
    Detailed,
}

/// Persona the assistant speaks as.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    #[default]
    Coach,
    Friend,
    Therapist,
}

macro_rules! style_enum_strings {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $($ty::$variant => write!(f, $text)),+
                }
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($text => Ok($ty::$variant),)+
                    other => Err(format!(
                        concat!("invalid ", stringify!($ty), ": '{}'"),
                        other
                    )),
                }
            }
        }
    };
}

style_enum_strings!(Tone { Warm => "warm", Direct => "direct", Playful => "playful" });
style_enum_strings!(ReplyLength { Brief => "brief", Standard => "standard", Detailed => "detailed" });
style_enum_strings!(Voice { Coach => "coach", Friend => "friend", Therapist => "therapist" });
