//! Conversation messages.

use serde::{Deserialize, Serialize};

/// One turn of a conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: text.into(),
        }
    }
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// System instructions and the remaining turns, split apart for vendors that
/// take the system prompt as a separate top-level field.
///
/// The explicit `system` argument comes first, followed by any system turns
/// found in the history, joined by a blank line.
pub fn split_system(system: Option<&str>, messages: &[Message]) -> (Option<String>, Vec<Message>) {
    let mut system_parts: Vec<&str> = Vec::new();
    if let Some(s) = system.map(str::trim).filter(|s| !s.is_empty()) {
        system_parts.push(s);
    }
    let mut turns = Vec::with_capacity(messages.len());
    for m in messages {
        match m.role {
            MessageRole::System => system_parts.push(m.content.as_str()),
            _ => turns.push(m.clone()),
        }
    }
    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };
    (system, turns)
}
