use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

use crate::auth::JwtManager;
use crate::config::Settings;
use crate::database::{DbPool, Repository};
use crate::services::conversation::{
    ConversationStore, HistoryLoader, PersistenceWriter, QueryReformulator, TurnOrchestrator,
};
use crate::services::{EmbeddingService, LlmService, VectorRetriever};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub repository: Arc<Repository>,
    pub embedding_service: Arc<EmbeddingService>,
    pub llm_service: Arc<LlmService>,
    pub jwt: Arc<JwtManager>,
    pipeline: Arc<RwLock<Option<Arc<TurnOrchestrator>>>>,
}

impl AppState {
    pub fn new(settings: Settings, db_pool: DbPool) -> Self {
        let repository = Arc::new(Repository::new(db_pool));
        let embedding_service = Arc::new(EmbeddingService::new(settings.embedding.clone()));
        let llm_service = Arc::new(LlmService::new(settings.llm.clone()));
        let jwt = Arc::new(JwtManager::new(
            &settings.auth.jwt_secret,
            settings.auth.token_expiry_seconds,
        ));

        Self {
            settings,
            repository,
            embedding_service,
            llm_service,
            jwt,
            pipeline: Arc::new(RwLock::new(None)),
        }
    }

    /// The turn pipeline is assembled once on first use and reused for the
    /// process lifetime; `reset_pipeline` is the only way to rebuild it.
    pub fn orchestrator(&self) -> Arc<TurnOrchestrator> {
        if let Some(orchestrator) = self.pipeline.read().as_ref() {
            return orchestrator.clone();
        }

        let mut slot = self.pipeline.write();
        if let Some(orchestrator) = slot.as_ref() {
            return orchestrator.clone();
        }

        info!("Initializing turn pipeline");
        let orchestrator = Arc::new(self.build_orchestrator());
        *slot = Some(orchestrator.clone());
        orchestrator
    }

    pub fn reset_pipeline(&self) {
        *self.pipeline.write() = None;
    }

    fn build_orchestrator(&self) -> TurnOrchestrator {
        let store: Arc<dyn ConversationStore> = self.repository.clone();

        let retriever = Arc::new(VectorRetriever::new(
            self.embedding_service.clone(),
            self.repository.clone(),
            self.settings.retrieval.clone(),
        ));

        TurnOrchestrator::new(
            HistoryLoader::new(store.clone()),
            QueryReformulator::new(
                self.llm_service.clone(),
                self.settings.prompts.rephrase_prompt.clone(),
            ),
            retriever,
            self.llm_service.clone(),
            PersistenceWriter::new(store),
            self.settings.prompts.clone(),
            self.settings.retrieval.clone(),
        )
    }
}
