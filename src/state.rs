//! UI-agnostic conversation types
//!
//! These are shared by the TUI, the one-shot `ask` command and the provider
//! clients, and don't depend on any rendering code.

use serde::{Deserialize, Serialize};

/// Label shown for a citation the provider returned without a title
pub const UNTITLED_SOURCE: &str = "Documentation";

/// A single entry in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub content: String,
    /// Epoch milliseconds
    pub timestamp: i64,
    #[serde(default)]
    pub sources: Vec<Source>,
}

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
    Tool,
}

/// A web reference the model consulted while answering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub url: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            sources: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>, sources: Vec<Source>) -> Self {
        Self {
            sources,
            ..Self::new(ChatRole::Assistant, content)
        }
    }
}

impl Source {
    /// Build a citation, substituting the default label for a missing or blank title
    pub fn new(title: Option<&str>, url: impl Into<String>) -> Self {
        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(UNTITLED_SOURCE);
        Self {
            title: title.to_string(),
            url: url.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_get_distinct_ids() {
        let a = ChatMessage::user("hello");
        let b = ChatMessage::user("hello");
        assert_ne!(a.id, b.id);
        assert!(a.timestamp > 0);
        assert!(a.sources.is_empty());
    }

    #[test]
    fn test_source_title_fallback() {
        assert_eq!(Source::new(None, "https://a.dev").title, UNTITLED_SOURCE);
        assert_eq!(Source::new(Some("  "), "https://a.dev").title, UNTITLED_SOURCE);
        assert_eq!(Source::new(Some("Docs"), "https://a.dev").title, "Docs");
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&ChatRole::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }
}
