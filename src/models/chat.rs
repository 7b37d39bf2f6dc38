use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ===== REQUEST MODELS =====

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub conversation_id: Option<Uuid>,
    pub content: String,
}

// ===== LLM WIRE MODELS =====

/// One prompt message in OpenAI chat-completions shape.
/// Role is "system", "user" or "assistant".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}
