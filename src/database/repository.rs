use super::{Conversation, ContextPassage, DbPool, Message, SenderRole};
use crate::services::conversation::ConversationStore;
use anyhow::Result;
use pgvector::Vector;
use tracing::debug;
use uuid::Uuid;

pub struct Repository {
    pub pool: DbPool,
}

impl Repository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create_conversation(&self, user_id: Uuid, title: &str) -> Result<Conversation> {
        let conversation = sqlx::query_as::<_, Conversation>(
            r#"INSERT INTO conversations (id, user_id, title)
               VALUES ($1, $2, $3)
               RETURNING id, user_id, title, created_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(title)
        .fetch_one(self.pool.get_pool())
        .await?;

        Ok(conversation)
    }

    pub async fn find_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        let conversation = sqlx::query_as::<_, Conversation>(
            r#"SELECT id, user_id, title, created_at
               FROM conversations
               WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(self.pool.get_pool())
        .await?;

        Ok(conversation)
    }

    pub async fn list_conversations(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
        let conversations = sqlx::query_as::<_, Conversation>(
            r#"SELECT id, user_id, title, created_at
               FROM conversations
               WHERE user_id = $1
               ORDER BY created_at DESC"#,
        )
        .bind(user_id)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(conversations)
    }

    pub async fn insert_message(
        &self,
        conversation_id: Uuid,
        sender: SenderRole,
        content: &str,
    ) -> Result<Message> {
        let message = sqlx::query_as::<_, Message>(
            r#"INSERT INTO messages (id, conversation_id, sender, content)
               VALUES ($1, $2, $3, $4)
               RETURNING id, conversation_id, sender, content, created_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(conversation_id)
        .bind(sender.as_str())
        .bind(content)
        .fetch_one(self.pool.get_pool())
        .await?;

        Ok(message)
    }

    /// Last `limit` messages of a conversation, oldest first.
    pub async fn recent_messages(&self, conversation_id: Uuid, limit: i64) -> Result<Vec<Message>> {
        let messages = sqlx::query_as::<_, Message>(
            r#"SELECT id, conversation_id, sender, content, created_at FROM (
                 SELECT id, conversation_id, sender, content, created_at
                 FROM messages
                 WHERE conversation_id = $1
                 ORDER BY created_at DESC
                 LIMIT $2
               ) recent
               ORDER BY created_at ASC"#,
        )
        .bind(conversation_id)
        .bind(limit)
        .fetch_all(self.pool.get_pool())
        .await?;

        debug!(
            "Loaded {} history messages for conversation {}",
            messages.len(),
            conversation_id
        );

        Ok(messages)
    }

    pub async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        let messages = sqlx::query_as::<_, Message>(
            r#"SELECT id, conversation_id, sender, content, created_at
               FROM messages
               WHERE conversation_id = $1
               ORDER BY created_at ASC"#,
        )
        .bind(conversation_id)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(messages)
    }

    /// Cosine similarity search over the reference passages.
    pub async fn search_passages(
        &self,
        query_embedding: Vector,
        limit: i32,
    ) -> Result<Vec<ContextPassage>> {
        let passages = sqlx::query_as::<_, ContextPassage>(
            r#"SELECT
                content,
                source,
                (1 - (embedding <=> $1))::real AS similarity
               FROM passages
               ORDER BY embedding <=> $1
               LIMIT $2"#,
        )
        .bind(query_embedding)
        .bind(limit)
        .fetch_all(self.pool.get_pool())
        .await?;

        debug!("Found {} relevant passages", passages.len());

        Ok(passages)
    }
}

// Store trait used by the turn pipeline
#[async_trait::async_trait]
impl ConversationStore for Repository {
    async fn create_conversation(&self, user_id: Uuid, title: &str) -> Result<Conversation> {
        Repository::create_conversation(self, user_id, title).await
    }

    async fn find_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        Repository::find_conversation(self, id).await
    }

    async fn insert_message(
        &self,
        conversation_id: Uuid,
        sender: SenderRole,
        content: &str,
    ) -> Result<Message> {
        Repository::insert_message(self, conversation_id, sender, content).await
    }

    async fn recent_messages(&self, conversation_id: Uuid, limit: i64) -> Result<Vec<Message>> {
        Repository::recent_messages(self, conversation_id, limit).await
    }
}
