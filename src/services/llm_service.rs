use crate::config::LlmConfig;
use crate::models::chat::ChatMessage;
use crate::services::conversation::LlmProvider;
use crate::utils::error::ApiError;
use futures::stream::Stream;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::debug;

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: usize,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    choices: Vec<ChoiceChunk>,
}

#[derive(Debug, Deserialize)]
struct ChoiceChunk {
    delta: Delta,
}

#[derive(Debug, Deserialize)]
struct Delta {
    content: Option<String>,
}

/// Shared flag that lets the consumer stop a generation stream explicitly.
/// Once cancelled, the stream reports end-of-stream and the underlying HTTP
/// body is dropped, which aborts the upstream request.
#[derive(Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Lazy pull-based sequence of answer-text increments. A mid-stream upstream
/// failure surfaces as a terminal `Err` item.
pub struct TokenStream {
    inner: Pin<Box<dyn Stream<Item = Result<String, ApiError>> + Send>>,
    cancel: CancelHandle,
}

impl TokenStream {
    pub fn new(inner: Pin<Box<dyn Stream<Item = Result<String, ApiError>> + Send>>) -> Self {
        Self {
            inner,
            cancel: CancelHandle::new(),
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    #[cfg(test)]
    pub(crate) fn from_increments(increments: Vec<Result<String, ApiError>>) -> Self {
        Self::new(Box::pin(futures::stream::iter(increments)))
    }
}

impl Stream for TokenStream {
    type Item = Result<String, ApiError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.cancel.is_cancelled() {
            return Poll::Ready(None);
        }
        this.inner.as_mut().poll_next(cx)
    }
}

#[derive(Clone)]
pub struct LlmService {
    client: Client,
    config: LlmConfig,
}

impl LlmService {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(config.timeout_seconds))
                .build()
                .unwrap_or_else(|_| Client::new()),
            config,
        }
    }

    /// Generate completion with streaming delivery.
    pub async fn chat_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream, ApiError> {
        debug!("Starting chat stream with {} messages", messages.len());

        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            stream: true,
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.config.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| ApiError::LlmError(format!("Failed to call LLM API: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::LlmError(format!(
                "LLM API error: {} - {}",
                status, body
            )));
        }

        let mut byte_stream = response.bytes_stream();

        // SSE frames can arrive split or coalesced arbitrarily, so lines are
        // reassembled through a buffer before parsing.
        let parsed = async_stream::stream! {
            let mut buffer = String::new();

            while let Some(chunk) = byte_stream.next().await {
                match chunk {
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));

                        while let Some(newline) = buffer.find('\n') {
                            let line = buffer[..newline].trim().to_string();
                            buffer.drain(..=newline);

                            let data = match line.strip_prefix("data: ") {
                                Some(data) => data,
                                None => continue,
                            };

                            if data == "[DONE]" {
                                return;
                            }

                            if let Some(content) = parse_delta(data) {
                                if !content.is_empty() {
                                    yield Ok(content);
                                }
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(ApiError::LlmError(format!("Stream error: {}", e)));
                        return;
                    }
                }
            }
        };

        Ok(TokenStream::new(Box::pin(parsed)))
    }

    /// Generate completion without streaming (wait for full response).
    pub async fn generate_chat(&self, messages: &[ChatMessage]) -> Result<String, ApiError> {
        debug!("Starting chat generation with {} messages", messages.len());

        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.config.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| ApiError::LlmError(format!("Failed to call LLM API: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::LlmError(format!(
                "LLM API error: {} - {}",
                status, body
            )));
        }

        #[derive(Deserialize)]
        struct ChatCompletionResponse {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ResponseMessage,
        }
        #[derive(Deserialize)]
        struct ResponseMessage {
            content: String,
        }

        let chat_response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ApiError::LlmError(format!("Failed to parse LLM response: {}", e)))?;

        chat_response
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| ApiError::LlmError("No choices returned from LLM".to_string()))
    }
}

fn parse_delta(data: &str) -> Option<String> {
    let chunk: ChatCompletionChunk = serde_json::from_str(data).ok()?;
    chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
}

#[async_trait::async_trait]
impl LlmProvider for LlmService {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, ApiError> {
        self.generate_chat(messages).await
    }

    async fn generate_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream, ApiError> {
        self.chat_stream(messages).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_delta_extracts_content() {
        let data = r#"{"choices":[{"delta":{"content":"Hello"}}]}"#;
        assert_eq!(parse_delta(data), Some("Hello".to_string()));
    }

    #[test]
    fn test_parse_delta_empty_delta() {
        let data = r#"{"choices":[{"delta":{}}]}"#;
        assert_eq!(parse_delta(data), None);
    }

    #[test]
    fn test_parse_delta_garbage() {
        assert_eq!(parse_delta("not json"), None);
    }

    #[tokio::test]
    async fn test_cancelled_stream_ends_without_remaining_items() {
        let stream = TokenStream::from_increments(vec![
            Ok("first".to_string()),
            Ok("second".to_string()),
        ]);
        let cancel = stream.cancel_handle();
        cancel.cancel();

        let items: Vec<_> = stream.collect().await;
        assert!(items.is_empty());
    }
}
