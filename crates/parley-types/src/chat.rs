//! Chat history, message, and rating types for Parley.
//!
//! A chat history is an append-only log of messages. Seeded template
//! messages come first, then one user/assistant pair per successful turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

use crate::context::ContextVars;
// Re-export MessageRole from llm module (it's used in both chat and llm contexts).
pub use crate::llm::MessageRole;

/// A persisted conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatHistory {
    pub id: Uuid,
    pub template_name: String,
    pub messages: Vec<HistoryMessage>,
    /// Tracked context snapshot, restricted to the template's logged vars.
    pub context_vars: ContextVars,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatHistory {
    pub fn message(&self, id: Uuid) -> Option<&HistoryMessage> {
        self.messages.iter().find(|m| m.id == id)
    }
}

/// A single message within a chat history.
///
/// User messages carry the context vars supplied with the turn. Assistant
/// messages carry the config that produced them, timing, and tool data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_vars: Option<ContextVars>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_data: Option<serde_json::Value>,
    /// Seeded from the template's initial messages.
    #[serde(default)]
    pub initial: bool,
    /// Current rating, read from the rating table when the history is loaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumb: Option<Thumb>,
}

impl HistoryMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            role,
            content: content.into(),
            created_at: Utc::now(),
            context_vars: None,
            config_name: None,
            generation_ms: None,
            tool_data: None,
            initial: false,
            thumb: None,
        }
    }

    /// A seeded template message.
    pub fn seeded(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            initial: true,
            ..Self::new(role, content)
        }
    }
}

/// Thumbs rating on a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Thumb {
    Up,
    Down,
}

impl fmt::Display for Thumb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Thumb::Up => write!(f, "up"),
            Thumb::Down => write!(f, "down"),
        }
    }
}

impl FromStr for Thumb {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "up" => Ok(Thumb::Up),
            "down" => Ok(Thumb::Down),
            other => Err(format!("invalid thumb: '{other}'")),
        }
    }
}

/// Rating totals for one history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingCounts {
    pub thumbs_up: u32,
    pub thumbs_down: u32,
}

/// Speaker of a visible transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptKind {
    User,
    Bot,
}

/// One message as shown to an end user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub id: Uuid,
    pub kind: TranscriptKind,
    pub message: String,
    pub thumb: Option<Thumb>,
    pub tool_data: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thumb_roundtrip() {
        for thumb in [Thumb::Up, Thumb::Down] {
            let parsed: Thumb = thumb.to_string().parse().unwrap();
            assert_eq!(thumb, parsed);
        }
        assert!("sideways".parse::<Thumb>().is_err());
    }

    #[test]
    fn test_seeded_message_flag() {
        let msg = HistoryMessage::seeded(MessageRole::Assistant, "Hi there");
        assert!(msg.initial);
        assert!(!HistoryMessage::new(MessageRole::User, "x").initial);
    }

    #[test]
    fn test_history_message_serde_skips_empty_metadata() {
        let msg = HistoryMessage::new(MessageRole::User, "hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("config_name").is_none());
        assert!(json.get("tool_data").is_none());
        assert_eq!(json["role"], "user");
    }
}
