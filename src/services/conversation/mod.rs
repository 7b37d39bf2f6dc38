//! Turn orchestration
//!
//! Everything between an accepted user turn and the closed client stream:
//! history assembly, the greeting fast path, history-aware query rewriting,
//! context retrieval, streamed generation and best-effort persistence.

pub mod history;
pub mod orchestrator;
pub mod persistence;
pub mod reformulator;
pub mod stream;

#[cfg(test)]
pub(crate) mod test_support;

pub use history::{HistoryLoader, ResolvedConversation};
pub use orchestrator::{
    ContextRetriever, ConversationStore, LlmProvider, Turn, TurnHandle, TurnOrchestrator,
    TurnPhase,
};
pub use persistence::PersistenceWriter;
pub use reformulator::QueryReformulator;
pub use stream::ResponseMultiplexer;
