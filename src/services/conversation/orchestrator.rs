use anyhow::Result;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::{PromptsConfig, RetrievalConfig};
use crate::database::{ContextPassage, Conversation, Message, SenderRole};
use crate::models::chat::ChatMessage;
use crate::services::fast_path::FastPathClassifier;
use crate::services::llm_service::TokenStream;
use crate::utils::error::ApiError;

use super::history::HistoryLoader;
use super::persistence::PersistenceWriter;
use super::reformulator::QueryReformulator;
use super::stream::pump_answer;

#[cfg(test)]
use mockall::automock;

/// Durable conversation/message log.
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_conversation(&self, user_id: Uuid, title: &str) -> Result<Conversation>;
    async fn find_conversation(&self, id: Uuid) -> Result<Option<Conversation>>;
    async fn insert_message(
        &self,
        conversation_id: Uuid,
        sender: SenderRole,
        content: &str,
    ) -> Result<Message>;
    async fn recent_messages(&self, conversation_id: Uuid, limit: i64) -> Result<Vec<Message>>;
}

/// Relevance-ordered passage lookup for a plain-text query.
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait ContextRetriever: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<Vec<ContextPassage>, ApiError>;
}

/// Chat completion backend, streaming and non-streaming.
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, ApiError>;
    async fn generate_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream, ApiError>;
}

/// Pipeline phases of one turn, in transition order. Used for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Received,
    ClassifyingFastPath,
    FastPathReply,
    LoadingHistory,
    Rephrasing,
    Retrieving,
    Generating,
    Streaming,
    Persisting,
    Completed,
    Failed,
}

/// One unit of work: a user turn against an optional existing conversation.
#[derive(Debug, Clone)]
pub struct Turn {
    pub conversation_id: Option<Uuid>,
    pub text: String,
}

/// Live result of an accepted turn: the conversation identity (known before
/// any content flows) plus the ordered chunk stream for the client. The
/// stream ends only after the AI message has been persisted.
#[derive(Debug)]
pub struct TurnHandle {
    pub conversation_id: Uuid,
    pub chunks: flume::Receiver<Bytes>,
}

/// Bounded so a slow client backpressures generation consumption instead of
/// buffering the whole answer.
const STREAM_CHANNEL_CAPACITY: usize = 32;

pub struct TurnOrchestrator {
    history: HistoryLoader,
    reformulator: QueryReformulator,
    retriever: Arc<dyn ContextRetriever>,
    llm: Arc<dyn LlmProvider>,
    persistence: PersistenceWriter,
    prompts: PromptsConfig,
    retrieval: RetrievalConfig,
}

impl TurnOrchestrator {
    pub fn new(
        history: HistoryLoader,
        reformulator: QueryReformulator,
        retriever: Arc<dyn ContextRetriever>,
        llm: Arc<dyn LlmProvider>,
        persistence: PersistenceWriter,
        prompts: PromptsConfig,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            history,
            reformulator,
            retriever,
            llm,
            persistence,
            prompts,
            retrieval,
        }
    }

    pub async fn run_turn(&self, user_id: Uuid, turn: Turn) -> Result<TurnHandle, ApiError> {
        match self.drive_turn(user_id, turn).await {
            Ok(handle) => Ok(handle),
            Err(e) => {
                debug!(phase = ?TurnPhase::Failed, error = %e, "turn failed before streaming");
                Err(e)
            }
        }
    }

    async fn drive_turn(&self, user_id: Uuid, turn: Turn) -> Result<TurnHandle, ApiError> {
        debug!(phase = ?TurnPhase::Received, %user_id, "turn phase");
        let text = turn.text.trim().to_string();
        if text.is_empty() {
            return Err(ApiError::BadRequest(
                "Message content is required".to_string(),
            ));
        }

        debug!(phase = ?TurnPhase::ClassifyingFastPath, "turn phase");
        if let Some(reply) = FastPathClassifier::classify(&text) {
            return self
                .fast_path_reply(user_id, turn.conversation_id, &text, reply)
                .await;
        }

        debug!(phase = ?TurnPhase::LoadingHistory, "turn phase");
        let resolved = self
            .history
            .resolve(user_id, turn.conversation_id, &text)
            .await?;
        let conversation_id = resolved.conversation.id;

        // Background write; never awaited on the turn's critical path.
        self.persistence.queue_user_message(conversation_id, &text);

        let query = if resolved.history.is_empty() {
            // First turn: nothing to disambiguate against, skip the rewrite
            // round-trip.
            text.clone()
        } else {
            debug!(phase = ?TurnPhase::Rephrasing, %conversation_id, "turn phase");
            self.reformulator.rewrite(&text, &resolved.history).await?
        };

        debug!(phase = ?TurnPhase::Retrieving, %conversation_id, "turn phase");
        let passages = self.retriever.retrieve(&query).await?;
        info!(%conversation_id, passages = passages.len(), "context retrieved");

        debug!(phase = ?TurnPhase::Generating, %conversation_id, "turn phase");
        // The rewrite serves retrieval only; the model answers the user's
        // own wording with the history present.
        let messages = self.build_messages(&passages, &resolved.history, &text);
        let tokens = self.llm.generate_stream(&messages).await?;

        debug!(phase = ?TurnPhase::Streaming, %conversation_id, "turn phase");
        let (sender, receiver) = flume::bounded(STREAM_CHANNEL_CAPACITY);
        let writer = self.persistence.clone();
        tokio::spawn(async move {
            pump_answer(tokens, sender, writer, conversation_id).await;
        });

        Ok(TurnHandle {
            conversation_id,
            chunks: receiver,
        })
    }

    /// Greeting shortcut: one canned chunk, both messages persisted, every
    /// later pipeline stage skipped.
    async fn fast_path_reply(
        &self,
        user_id: Uuid,
        conversation_id: Option<Uuid>,
        text: &str,
        reply: &'static str,
    ) -> Result<TurnHandle, ApiError> {
        let resolved = self.history.resolve(user_id, conversation_id, text).await?;
        let conversation_id = resolved.conversation.id;
        debug!(phase = ?TurnPhase::FastPathReply, %conversation_id, "turn phase");

        self.persistence.queue_user_message(conversation_id, text);

        let (sender, receiver) = flume::bounded(1);
        let writer = self.persistence.clone();
        tokio::spawn(async move {
            // The canned reply is persisted even when the client is already
            // gone; the exchange happened.
            let _ = sender.send_async(Bytes::from_static(reply.as_bytes())).await;
            if let Err(e) = writer.save_ai_message(conversation_id, reply).await {
                error!(%conversation_id, error = %e, "failed to persist fast-path reply");
            } else {
                debug!(phase = ?TurnPhase::Completed, %conversation_id, "turn phase");
            }
            drop(sender);
        });

        Ok(TurnHandle {
            conversation_id,
            chunks: receiver,
        })
    }

    fn build_messages(
        &self,
        passages: &[ContextPassage],
        history: &[ChatMessage],
        query: &str,
    ) -> Vec<ChatMessage> {
        let context = self.build_context(passages);

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage {
            role: "system".to_string(),
            content: format!("{}\n\nContext:\n{}", self.prompts.system_prompt, context),
        });
        messages.extend_from_slice(history);
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: query.to_string(),
        });

        messages
    }

    fn build_context(&self, passages: &[ContextPassage]) -> String {
        if passages.is_empty() {
            // The system prompt instructs the model not to invent context
            // when none is provided.
            return String::from("(no relevant passages found)");
        }

        let mut context = String::new();
        for (i, passage) in passages.iter().enumerate() {
            context.push_str(&format!(
                "[Source: {}]\n{}\n\n",
                passage.source, passage.content
            ));

            if context.len() > self.retrieval.max_context_length {
                debug!(
                    "Context truncated at {} passages (max length: {})",
                    i + 1,
                    self.retrieval.max_context_length
                );
                break;
            }
        }

        context
    }
}
