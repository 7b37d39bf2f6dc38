use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::database::{Conversation, Message};
use crate::models::chat::ChatMessage;
use crate::utils::error::ApiError;

use super::orchestrator::ConversationStore;

/// Most recent messages kept as generation context.
const HISTORY_WINDOW: i64 = 15;
/// Conversation titles are the head of the first turn.
const TITLE_MAX_CHARS: usize = 30;

#[derive(Debug)]
pub struct ResolvedConversation {
    pub conversation: Conversation,
    /// Oldest-first, at most [`HISTORY_WINDOW`] entries, already mapped to
    /// LLM roles. Recomputed every turn, never persisted.
    pub history: Vec<ChatMessage>,
    pub is_new: bool,
}

pub struct HistoryLoader {
    store: Arc<dyn ConversationStore>,
}

impl HistoryLoader {
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self { store }
    }

    /// Resolve the turn's conversation. No id creates a fresh conversation
    /// titled after the first turn; an id that does not exist or belongs to
    /// another user is `NotFound`.
    pub async fn resolve(
        &self,
        user_id: Uuid,
        conversation_id: Option<Uuid>,
        first_text: &str,
    ) -> Result<ResolvedConversation, ApiError> {
        match conversation_id {
            None => {
                let title = derive_title(first_text);
                let conversation = self
                    .store
                    .create_conversation(user_id, &title)
                    .await
                    .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

                debug!(conversation_id = %conversation.id, "conversation created");

                Ok(ResolvedConversation {
                    conversation,
                    history: Vec::new(),
                    is_new: true,
                })
            }
            Some(id) => {
                let conversation = self
                    .store
                    .find_conversation(id)
                    .await
                    .map_err(|e| ApiError::DatabaseError(e.to_string()))?
                    .filter(|conversation| conversation.user_id == user_id)
                    .ok_or_else(|| ApiError::NotFound("Conversation not found".to_string()))?;

                let messages = self
                    .store
                    .recent_messages(id, HISTORY_WINDOW)
                    .await
                    .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

                let history = messages.iter().map(to_chat_message).collect();

                Ok(ResolvedConversation {
                    conversation,
                    history,
                    is_new: false,
                })
            }
        }
    }
}

fn derive_title(text: &str) -> String {
    let trimmed = text.trim();
    let truncated: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
    if trimmed.chars().count() > TITLE_MAX_CHARS {
        format!("{}...", truncated)
    } else {
        truncated
    }
}

fn to_chat_message(message: &Message) -> ChatMessage {
    let role = if message.sender == "user" {
        "user"
    } else {
        "assistant"
    };

    ChatMessage {
        role: role.to_string(),
        content: message.content.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::conversation::orchestrator::MockConversationStore;
    use chrono::Utc;

    #[test]
    fn test_title_under_limit_kept_verbatim() {
        assert_eq!(derive_title("What is uric acid?"), "What is uric acid?");
    }

    #[test]
    fn test_title_over_limit_truncated_with_ellipsis() {
        let text = "I have been feeling dizzy every morning for two weeks";
        let title = derive_title(text);
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS + 3);
        assert!(title.ends_with("..."));
        assert!(text.starts_with(title.trim_end_matches("...")));
    }

    #[test]
    fn test_title_truncation_is_char_safe() {
        let text = "ü".repeat(40);
        let title = derive_title(&text);
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS + 3);
    }

    #[test]
    fn test_sender_roles_map_to_llm_roles() {
        let base = Message {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            sender: "user".to_string(),
            content: "hello".to_string(),
            created_at: Utc::now(),
        };
        assert_eq!(to_chat_message(&base).role, "user");

        let ai = Message {
            sender: "ai".to_string(),
            ..base
        };
        assert_eq!(to_chat_message(&ai).role, "assistant");
    }

    #[tokio::test]
    async fn test_missing_conversation_is_not_found() {
        let mut store = MockConversationStore::new();
        store.expect_find_conversation().returning(|_| Ok(None));

        let loader = HistoryLoader::new(Arc::new(store));
        let err = loader
            .resolve(Uuid::new_v4(), Some(Uuid::new_v4()), "hello")
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_foreign_conversation_is_not_found() {
        let conversation = Conversation {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: "t".to_string(),
            created_at: Utc::now(),
        };
        let id = conversation.id;

        let mut store = MockConversationStore::new();
        store
            .expect_find_conversation()
            .returning(move |_| Ok(Some(conversation.clone())));

        let loader = HistoryLoader::new(Arc::new(store));
        let err = loader
            .resolve(Uuid::new_v4(), Some(id), "hello")
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_history_window_is_bounded_and_ascending() {
        let user = Uuid::new_v4();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            user_id: user,
            title: "t".to_string(),
            created_at: Utc::now(),
        };
        let id = conversation.id;

        fn message(conversation_id: Uuid, sender: &str, content: &str) -> Message {
            Message {
                id: Uuid::new_v4(),
                conversation_id,
                sender: sender.to_string(),
                content: content.to_string(),
                created_at: Utc::now(),
            }
        }

        let mut store = MockConversationStore::new();
        store
            .expect_find_conversation()
            .returning(move |_| Ok(Some(conversation.clone())));
        store
            .expect_recent_messages()
            .withf(move |conversation_id, limit| *conversation_id == id && *limit == HISTORY_WINDOW)
            .times(1)
            .returning(|conversation_id, _| {
                Ok(vec![
                    message(conversation_id, "user", "first"),
                    message(conversation_id, "ai", "second"),
                ])
            });

        let loader = HistoryLoader::new(Arc::new(store));
        let resolved = loader.resolve(user, Some(id), "next").await.unwrap();

        assert_eq!(resolved.history.len(), 2);
        assert_eq!(resolved.history[0].content, "first");
        assert_eq!(resolved.history[0].role, "user");
        assert_eq!(resolved.history[1].role, "assistant");
    }

    #[tokio::test]
    async fn test_new_conversation_has_empty_window() {
        let mut store = MockConversationStore::new();
        store
            .expect_create_conversation()
            .withf(|_, title| title == "What is uric acid?")
            .returning(|user_id, title| {
                Ok(Conversation {
                    id: Uuid::new_v4(),
                    user_id,
                    title: title.to_string(),
                    created_at: Utc::now(),
                })
            });

        let loader = HistoryLoader::new(Arc::new(store));
        let resolved = loader
            .resolve(Uuid::new_v4(), None, "What is uric acid?")
            .await
            .unwrap();

        assert!(resolved.is_new);
        assert!(resolved.history.is_empty());
    }
}
