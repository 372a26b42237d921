//! Record types persisted by the store.

use serde::{Deserialize, Serialize};

/// Message role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageRole {
    /// User message
    User,
    /// Assistant (AI) response
    Assistant,
}

impl MessageRole {
    /// Convert to string representation for database storage.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Parse from string representation.
    pub fn parse(s: &str) -> Self {
        match s {
            "assistant" => Self::Assistant,
            _ => Self::User, // Default fallback
        }
    }
}

/// One entry in a conversation's append-only message log.
///
/// `message_index` is a per-conversation monotonically increasing
/// sequence and establishes the total order; the wall-clock timestamp
/// is informational only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Database row ID
    pub id: i64,
    /// Conversation this message belongs to
    pub conversation_id: String,
    /// Message role (user/assistant)
    pub role: MessageRole,
    /// Message content
    pub content: String,
    /// Unix timestamp (seconds)
    pub timestamp: i64,
    /// Per-conversation ordering index (0-based, contiguous after eviction)
    pub message_index: i64,
}

/// Mapping from an external chat handle to a logical conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationContext {
    /// External chat handle (unique key)
    pub chat_handle: String,
    /// Logical conversation id grouping the message log
    pub conversation_id: String,
    /// Unix timestamp (seconds) of last access
    pub last_used: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_storage_form() {
        assert_eq!(MessageRole::parse(MessageRole::User.as_str()), MessageRole::User);
        assert_eq!(
            MessageRole::parse(MessageRole::Assistant.as_str()),
            MessageRole::Assistant
        );
    }

    #[test]
    fn unknown_role_falls_back_to_user() {
        assert_eq!(MessageRole::parse("system"), MessageRole::User);
    }
}
