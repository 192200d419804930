//! Message domain types.
//!
//! These are the value objects that flow through the whole cockpit:
//! the Steward types a line, the Orchestrator wraps it in a `ChatMessage`,
//! the composer and the provider adapters consume the history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who is speaking in a session.
///
/// `Council` marks a second-seat model's response. It is held in history
/// for the steward's benefit but never mapped onto an assistant role when
/// a request is built for the primary model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human at the keyboard
    Steward,
    /// The local model
    Node,
    /// A second-seat model consulted via the council gate
    Council,
    /// Composed instructions
    System,
}

/// A single message in the in-RAM session history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,

    pub role: Role,

    pub content: String,

    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn steward(content: impl Into<String>) -> Self {
        Self::with_role(Role::Steward, content)
    }

    pub fn node(content: impl Into<String>) -> Self {
        Self::with_role(Role::Node, content)
    }

    pub fn council(content: impl Into<String>) -> Self {
        Self::with_role(Role::Council, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steward_message_has_role() {
        let msg = ChatMessage::steward("hello there");
        assert_eq!(msg.role, Role::Steward);
        assert_eq!(msg.content, "hello there");
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Council).unwrap();
        assert_eq!(json, "\"council\"");
    }

    #[test]
    fn message_serialization_roundtrip() {
        let msg = ChatMessage::node("a reply");
        let json = serde_json::to_string(&msg).unwrap();
        let back: ChatMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.content, "a reply");
        assert_eq!(back.role, Role::Node);
    }
}
