//! Core types — UserId, Role, Message, Conversation, MessageHandle.

use serde::{Deserialize, Serialize};

// ── Identity ──

/// Telegram user id. Key for all per-user state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Messages ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// ── Conversation ──

/// Append-only message history of one user.
///
/// At most one system message exists, and if it does it is the first one.
/// The only way to add one is [`Conversation::ensure_system`].
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
    }

    /// Insert the system instruction at the front unless one is present.
    /// Returns true if it was inserted.
    pub fn ensure_system(&mut self, instruction: &str) -> bool {
        if self.messages.iter().any(|m| m.role == Role::System) {
            return false;
        }
        self.messages.insert(0, Message::system(instruction));
        true
    }
}

// ── Transport ──

/// Reference to a message already sent, for later edit/delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHandle {
    pub chat_id: i64,
    pub message_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Html,
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    pub parse_mode: ParseMode,
    pub disable_link_preview: bool,
}

impl SendOptions {
    pub fn plain() -> Self {
        Self {
            parse_mode: ParseMode::Plain,
            disable_link_preview: false,
        }
    }

    /// Rich text, as used for model replies.
    pub fn html() -> Self {
        Self {
            parse_mode: ParseMode::Html,
            disable_link_preview: true,
        }
    }
}
