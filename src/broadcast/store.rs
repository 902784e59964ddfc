use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::broadcast::recipients::RecipientHandle;
use crate::broadcast::UserId;

/// Where a user is in the broadcast dialogue. No entry means `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    Idle,
    AwaitingMessage,
    AwaitingRecipients,
}

/// The message and recipients collected so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub body: Option<String>,
    pub recipients: Option<Vec<RecipientHandle>>,
}

/// Per-user conversation entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub state: ConversationState,
    pub draft: Draft,
}

impl Conversation {
    fn fresh() -> Self {
        Self {
            state: ConversationState::AwaitingMessage,
            draft: Draft::default(),
        }
    }
}

/// In-memory, process-lifetime map from user to conversation.
///
/// Each call holds the lock for the whole read-modify-write, so a transition
/// for one user is atomic. The lock is never held across platform I/O.
#[derive(Default)]
pub struct ConversationStore {
    conversations: Mutex<HashMap<UserId, Conversation>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh draft, replacing anything the user had in progress.
    pub async fn begin(&self, user_id: UserId) {
        let mut conversations = self.conversations.lock().await;
        conversations.insert(user_id, Conversation::fresh());
    }

    #[cfg(test)]
    pub async fn state(&self, user_id: UserId) -> ConversationState {
        let conversations = self.conversations.lock().await;
        conversations
            .get(&user_id)
            .map(|c| c.state)
            .unwrap_or(ConversationState::Idle)
    }

    /// Apply `f` to the user's entry atomically. Setting the entry to `None`
    /// (or leaving the state `Idle`) removes it.
    pub async fn update<F, R>(&self, user_id: UserId, f: F) -> R
    where
        F: FnOnce(&mut Option<Conversation>) -> R,
    {
        let mut conversations = self.conversations.lock().await;
        let mut entry = conversations.remove(&user_id);
        let result = f(&mut entry);
        if let Some(conversation) = entry {
            if conversation.state != ConversationState::Idle {
                conversations.insert(user_id, conversation);
            }
        }
        result
    }

    /// Drop the user's entry. Returns whether one existed.
    pub async fn clear(&self, user_id: UserId) -> bool {
        let mut conversations = self.conversations.lock().await;
        conversations.remove(&user_id).is_some()
    }

    #[cfg(test)]
    pub async fn get(&self, user_id: UserId) -> Option<Conversation> {
        self.conversations.lock().await.get(&user_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_entry_is_idle() {
        let store = ConversationStore::new();
        assert_eq!(store.state(1).await, ConversationState::Idle);
        assert!(!store.clear(1).await);
    }

    #[tokio::test]
    async fn test_begin_overwrites_previous_draft() {
        let store = ConversationStore::new();
        store.begin(1).await;
        store
            .update(1, |entry| {
                if let Some(c) = entry {
                    c.state = ConversationState::AwaitingRecipients;
                    c.draft.body = Some("old".to_string());
                }
            })
            .await;

        store.begin(1).await;

        let conversation = store.get(1).await.unwrap();
        assert_eq!(conversation.state, ConversationState::AwaitingMessage);
        assert_eq!(conversation.draft, Draft::default());
    }

    #[tokio::test]
    async fn test_update_to_idle_removes_entry() {
        let store = ConversationStore::new();
        store.begin(1).await;
        store
            .update(1, |entry| {
                if let Some(c) = entry {
                    c.state = ConversationState::Idle;
                }
            })
            .await;
        assert!(store.get(1).await.is_none());
    }

    #[tokio::test]
    async fn test_users_are_independent() {
        let store = ConversationStore::new();
        store.begin(1).await;
        store.begin(2).await;
        assert!(store.clear(1).await);
        assert_eq!(store.state(1).await, ConversationState::Idle);
        assert_eq!(store.state(2).await, ConversationState::AwaitingMessage);
    }
}
