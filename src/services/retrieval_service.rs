use crate::config::RetrievalConfig;
use crate::database::{ContextPassage, Repository};
use crate::services::conversation::ContextRetriever;
use crate::services::EmbeddingService;
use crate::utils::error::ApiError;
use pgvector::Vector;
use std::sync::Arc;
use tracing::info;

/// Embedding + pgvector similarity search over the reference passages.
pub struct VectorRetriever {
    embedding_service: Arc<EmbeddingService>,
    repository: Arc<Repository>,
    config: RetrievalConfig,
}

impl VectorRetriever {
    pub fn new(
        embedding_service: Arc<EmbeddingService>,
        repository: Arc<Repository>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedding_service,
            repository,
            config,
        }
    }
}

#[async_trait::async_trait]
impl ContextRetriever for VectorRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<ContextPassage>, ApiError> {
        info!("Retrieving context for query: {}", query);

        let query_embedding = self.embedding_service.embed(query).await?;

        let passages = self
            .repository
            .search_passages(Vector::from(query_embedding), self.config.top_k as i32)
            .await
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

        Ok(passages)
    }
}
