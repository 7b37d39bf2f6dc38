use crate::config::EmbeddingConfig;
use crate::utils::error::ApiError;
use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    content: &'a str,
    input: &'a str,
}

#[derive(Clone)]
pub struct EmbeddingService {
    client: Client,
    config: EmbeddingConfig,
}

impl EmbeddingService {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .unwrap_or_else(|_| Client::new()),
            config,
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ApiError> {
        self.embed_internal(text)
            .await
            .map_err(|e| ApiError::LlmError(e.to_string()))
    }

    async fn embed_internal(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Generating embedding for {} chars", text.len());

        // Both field names so llama.cpp and OpenAI-style servers accept it
        let request = EmbeddingRequest {
            content: text,
            input: text,
        };

        let url = format!("{}/embedding", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to connect to embedding server")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Embedding API error ({}): {}", status, body);
        }

        let value: serde_json::Value = response
            .json()
            .await
            .context("Failed to parse embedding response as JSON")?;

        let embedding = Self::extract_embedding(&value)?;

        if embedding.len() != self.config.dimension {
            anyhow::bail!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.config.dimension,
                embedding.len()
            );
        }

        Ok(embedding)
    }

    /// Accepts the llama.cpp shape `{"embedding": [...]}` and the OpenAI
    /// shape `{"data": [{"embedding": [...]}]}`.
    fn extract_embedding(value: &serde_json::Value) -> Result<Vec<f32>> {
        let raw = if let Some(direct) = value.get("embedding") {
            direct
        } else if let Some(nested) = value
            .get("data")
            .and_then(|data| data.get(0))
            .and_then(|entry| entry.get("embedding"))
        {
            nested
        } else {
            anyhow::bail!("Unrecognized embedding response format: {}", value);
        };

        let embedding: Vec<f32> =
            serde_json::from_value(raw.clone()).context("Embedding field is not a float array")?;

        if embedding.is_empty() {
            anyhow::bail!("Generated embedding is empty");
        }

        Ok(embedding)
    }
}
