use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Conversation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only chat log row. Ordering within a conversation is by
/// `created_at` ascending; no role-alternation constraint is enforced.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderRole {
    User,
    Ai,
}

impl SenderRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderRole::User => "user",
            SenderRole::Ai => "ai",
        }
    }
}

/// Retrieved reference fragment with provenance. Lives only for the turn
/// that retrieved it.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ContextPassage {
    pub content: String,
    pub source: String,
    pub similarity: f32,
}
