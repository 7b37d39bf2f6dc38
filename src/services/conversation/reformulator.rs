use std::sync::Arc;
use tracing::{debug, warn};

use crate::models::chat::ChatMessage;
use crate::utils::error::ApiError;

use super::orchestrator::LlmProvider;

/// Rewrites a follow-up turn into a standalone query using the history
/// window. Only called for non-first turns; first turns have nothing to
/// disambiguate against and skip the extra generation round-trip.
pub struct QueryReformulator {
    llm: Arc<dyn LlmProvider>,
    template: String,
}

impl QueryReformulator {
    pub fn new(llm: Arc<dyn LlmProvider>, template: String) -> Self {
        Self { llm, template }
    }

    /// Upstream failure propagates: an un-rewritten ambiguous query would
    /// silently degrade retrieval, so there is no local fallback.
    pub async fn rewrite(
        &self,
        raw_query: &str,
        history: &[ChatMessage],
    ) -> Result<String, ApiError> {
        let instruction = self
            .template
            .replace("{{HISTORY}}", &render_history(history))
            .replace("{{QUESTION}}", raw_query);

        let messages = vec![ChatMessage {
            role: "user".to_string(),
            content: instruction,
        }];

        let rewritten = self.llm.generate(&messages).await?;
        let rewritten = rewritten.trim();

        if rewritten.is_empty() {
            warn!("Rewrite came back empty, keeping the original query");
            return Ok(raw_query.to_string());
        }

        debug!(raw = raw_query, rewritten, "query reformulated");
        Ok(rewritten.to_string())
    }
}

fn render_history(history: &[ChatMessage]) -> String {
    history
        .iter()
        .map(|message| format!("{}: {}", message.role, message.content))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::conversation::orchestrator::MockLlmProvider;

    fn history() -> Vec<ChatMessage> {
        vec![
            ChatMessage {
                role: "user".to_string(),
                content: "What is uric acid?".to_string(),
            },
            ChatMessage {
                role: "assistant".to_string(),
                content: "A waste product in the blood.".to_string(),
            },
        ]
    }

    #[test]
    fn test_history_renders_one_line_per_message() {
        let rendered = render_history(&history());
        assert_eq!(
            rendered,
            "user: What is uric acid?\nassistant: A waste product in the blood."
        );
    }

    #[tokio::test]
    async fn test_rewrite_fills_template() {
        let mut llm = MockLlmProvider::new();
        llm.expect_generate()
            .withf(|messages| {
                let content = &messages[0].content;
                content.contains("user: What is uric acid?")
                    && content.contains("What are its treatments?")
            })
            .times(1)
            .returning(|_| Ok("What are the treatments for high uric acid?".to_string()));

        let reformulator = QueryReformulator::new(
            Arc::new(llm),
            "History:\n{{HISTORY}}\n\nQuestion: {{QUESTION}}".to_string(),
        );

        let rewritten = reformulator
            .rewrite("What are its treatments?", &history())
            .await
            .unwrap();

        assert_eq!(rewritten, "What are the treatments for high uric acid?");
    }

    #[tokio::test]
    async fn test_blank_rewrite_keeps_original_query() {
        let mut llm = MockLlmProvider::new();
        llm.expect_generate()
            .returning(|_| Ok("  \n ".to_string()));

        let reformulator =
            QueryReformulator::new(Arc::new(llm), "{{HISTORY}} {{QUESTION}}".to_string());

        let rewritten = reformulator
            .rewrite("What are its treatments?", &history())
            .await
            .unwrap();

        assert_eq!(rewritten, "What are its treatments?");
    }

    #[tokio::test]
    async fn test_upstream_failure_propagates() {
        let mut llm = MockLlmProvider::new();
        llm.expect_generate()
            .returning(|_| Err(ApiError::LlmError("connection refused".to_string())));

        let reformulator =
            QueryReformulator::new(Arc::new(llm), "{{HISTORY}} {{QUESTION}}".to_string());

        let err = reformulator
            .rewrite("What are its treatments?", &history())
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::LlmError(_)));
    }
}
