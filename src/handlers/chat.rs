use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::Response,
    Json,
};
use futures::StreamExt;
use std::convert::Infallible;
use tracing::info;

use crate::auth::AuthUser;
use crate::models::chat::ChatRequest;
use crate::services::conversation::Turn;
use crate::state::AppState;
use crate::utils::error::ApiError;

/// Accepts one turn and streams the answer back as chunked plain text.
/// The conversation id travels out-of-band in `x-conversation-id`, set
/// before the first content chunk.
pub async fn send_message_handler(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    info!(
        user_id = %user.user_id,
        content_len = request.content.len(),
        has_conversation = request.conversation_id.is_some(),
        "incoming chat turn"
    );

    let orchestrator = state.orchestrator();
    let handle = orchestrator
        .run_turn(
            user.user_id,
            Turn {
                conversation_id: request.conversation_id,
                text: request.content,
            },
        )
        .await?;

    let body = Body::from_stream(handle.chunks.into_stream().map(Ok::<_, Infallible>));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache")
        .header("x-conversation-id", handle.conversation_id.to_string())
        .header("access-control-expose-headers", "x-conversation-id")
        // Proxies must not buffer the token stream
        .header("x-accel-buffering", "no")
        .body(body)
        .map_err(|e| ApiError::InternalError(e.to_string()))
}
