pub mod conversation;
pub mod embedding_service;
pub mod fast_path;
pub mod llm_service;
pub mod retrieval_service;

pub use embedding_service::EmbeddingService;
pub use fast_path::FastPathClassifier;
pub use llm_service::{CancelHandle, LlmService, TokenStream};
pub use retrieval_service::VectorRetriever;
