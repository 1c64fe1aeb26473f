//! Conversation store — process-wide map from user to message history.
//!
//! The map lock is only taken to look up or insert an entry. Each
//! conversation carries its own lock, so users never contend with each
//! other. Entries live for the process lifetime.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::types::{Conversation, Message, UserId};

pub type SharedConversation = Arc<Mutex<Conversation>>;

#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: RwLock<HashMap<UserId, SharedConversation>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Conversation of `user`, created empty on first use.
    pub async fn get_or_create(&self, user: UserId) -> SharedConversation {
        if let Some(conv) = self.conversations.read().await.get(&user) {
            return Arc::clone(conv);
        }
        let mut conversations = self.conversations.write().await;
        Arc::clone(conversations.entry(user).or_default())
    }

    pub async fn get(&self, user: UserId) -> Option<SharedConversation> {
        self.conversations.read().await.get(&user).cloned()
    }

    /// Copy of the messages of `user`, empty if unknown.
    pub async fn messages(&self, user: UserId) -> Vec<Message> {
        match self.get(user).await {
            Some(conv) => conv.lock().await.messages().to_vec(),
            None => Vec::new(),
        }
    }

    /// Number of users seen so far.
    pub async fn user_count(&self) -> usize {
        self.conversations.read().await.len()
    }
}
