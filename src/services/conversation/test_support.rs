use anyhow::Result;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

use crate::database::{Conversation, Message, SenderRole};

use super::orchestrator::ConversationStore;

/// In-memory stand-in for the relational store.
#[derive(Default)]
pub struct InMemoryStore {
    conversations: Mutex<Vec<Conversation>>,
    messages: Mutex<Vec<Message>>,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed_conversation(&self, user_id: Uuid) -> Conversation {
        let conversation = Conversation {
            id: Uuid::new_v4(),
            user_id,
            title: "seeded".to_string(),
            created_at: Utc::now(),
        };
        self.conversations.lock().push(conversation.clone());
        conversation
    }

    pub fn seed_message(&self, conversation_id: Uuid, sender: SenderRole, content: &str) {
        self.messages.lock().push(Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender: sender.as_str().to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        });
    }

    pub fn conversations(&self) -> Vec<Conversation> {
        self.conversations.lock().clone()
    }

    pub fn conversation_count(&self) -> usize {
        self.conversations.lock().len()
    }

    pub fn messages_for(&self, conversation_id: Uuid) -> Vec<Message> {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect()
    }

    /// Background writes land asynchronously; poll briefly instead of
    /// assuming scheduling order.
    pub async fn wait_for_message_count(&self, conversation_id: Uuid, expected: usize) -> bool {
        for _ in 0..100 {
            if self.messages_for(conversation_id).len() >= expected {
                return true;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        false
    }
}

#[async_trait::async_trait]
impl ConversationStore for InMemoryStore {
    async fn create_conversation(&self, user_id: Uuid, title: &str) -> Result<Conversation> {
        let conversation = Conversation {
            id: Uuid::new_v4(),
            user_id,
            title: title.to_string(),
            created_at: Utc::now(),
        };
        self.conversations.lock().push(conversation.clone());
        Ok(conversation)
    }

    async fn find_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        Ok(self
            .conversations
            .lock()
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn insert_message(
        &self,
        conversation_id: Uuid,
        sender: SenderRole,
        content: &str,
    ) -> Result<Message> {
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender: sender.as_str().to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        };
        self.messages.lock().push(message.clone());
        Ok(message)
    }

    async fn recent_messages(&self, conversation_id: Uuid, limit: i64) -> Result<Vec<Message>> {
        let matching: Vec<Message> = self
            .messages
            .lock()
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();

        // Insertion order stands in for created_at ordering.
        let skip = matching.len().saturating_sub(limit as usize);
        Ok(matching.into_iter().skip(skip).collect())
    }
}
