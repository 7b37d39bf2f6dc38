use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::database::{Conversation, Message};
use crate::state::AppState;
use crate::utils::error::ApiError;

pub async fn list_conversations_handler(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Conversation>>, ApiError> {
    let conversations = state
        .repository
        .list_conversations(user.user_id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    Ok(Json(conversations))
}

pub async fn list_messages_handler(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Message>>, ApiError> {
    // Conversations of other users are indistinguishable from missing ones.
    let conversation = state
        .repository
        .find_conversation(id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?
        .filter(|conversation| conversation.user_id == user.user_id)
        .ok_or_else(|| ApiError::NotFound("Conversation not found".to_string()))?;

    let messages = state
        .repository
        .list_messages(conversation.id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    Ok(Json(messages))
}
