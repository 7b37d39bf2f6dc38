use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::database::SenderRole;
use crate::utils::error::ApiError;

use super::orchestrator::ConversationStore;

const QUEUE_CAPACITY: usize = 1024;

struct PendingUserMessage {
    conversation_id: Uuid,
    content: String,
}

/// Writes both sides of an exchange. User messages go through a bounded
/// queue drained by a background worker and never block the turn's critical
/// path; the AI message is written inline and awaited before the stream
/// closes.
#[derive(Clone)]
pub struct PersistenceWriter {
    store: Arc<dyn ConversationStore>,
    queue: flume::Sender<PendingUserMessage>,
}

impl PersistenceWriter {
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        let (sender, receiver) = flume::bounded(QUEUE_CAPACITY);

        let worker_store = store.clone();
        tokio::spawn(async move {
            Self::worker_loop(worker_store, receiver).await;
        });

        Self {
            store,
            queue: sender,
        }
    }

    async fn worker_loop(
        store: Arc<dyn ConversationStore>,
        receiver: flume::Receiver<PendingUserMessage>,
    ) {
        while let Ok(pending) = receiver.recv_async().await {
            match store
                .insert_message(pending.conversation_id, SenderRole::User, &pending.content)
                .await
            {
                Ok(_) => {
                    debug!(conversation_id = %pending.conversation_id, "user message persisted")
                }
                Err(e) => {
                    // Logged only; the turn's outcome never depends on this.
                    error!(
                        conversation_id = %pending.conversation_id,
                        error = %e,
                        "background user message write failed"
                    )
                }
            }
        }
        debug!("persistence worker stopped");
    }

    /// Fire-and-forget; failure never reaches the turn's result.
    pub fn queue_user_message(&self, conversation_id: Uuid, content: &str) {
        let pending = PendingUserMessage {
            conversation_id,
            content: content.to_string(),
        };
        if self.queue.try_send(pending).is_err() {
            warn!(%conversation_id, "user message write dropped, queue full or worker gone");
        }
    }

    /// Awaited on the turn's tail. The client already holds the streamed
    /// text whether or not this succeeds.
    pub async fn save_ai_message(
        &self,
        conversation_id: Uuid,
        content: &str,
    ) -> Result<(), ApiError> {
        self.store
            .insert_message(conversation_id, SenderRole::Ai, content)
            .await
            .map(|_| ())
            .map_err(|e| ApiError::DatabaseError(e.to_string()))
    }
}
