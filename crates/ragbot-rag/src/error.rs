use thiserror::Error;

use ragbot_config::ConfigError;
use ragbot_providers::ProviderError;

/// Vector index invariant violations.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Embedding dimension mismatch: index has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Empty embedding")]
    EmptyEmbedding,
    #[error("Got {segments} segments but {embeddings} embeddings")]
    CountMismatch { segments: usize, embeddings: usize },
}

#[derive(Debug, Error)]
pub enum RagError {
    #[error("Failed to read document: {0}")]
    Parse(#[source] ProviderError),
    #[error("Embedding failed: {0}")]
    Embedding(#[source] ProviderError),
    #[error("Retrieval from {retriever} failed: {reason}")]
    Retrieval { retriever: String, reason: String },
    #[error("Generation failed: {0}")]
    Generation(#[source] ProviderError),
    #[error("Index error: {0}")]
    Index(#[from] IndexError),
    #[error("Empty corpus: no usable text found in {0}")]
    EmptyCorpus(String),
    #[error("Duplicate retriever id: {0}")]
    DuplicateRetriever(String),
    #[error("Question is empty")]
    EmptyQuestion,
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl RagError {
    /// Whether the failure comes from a cancelled remote call.
    pub fn is_cancelled(&self) -> bool {
        match self {
            RagError::Parse(e) | RagError::Embedding(e) | RagError::Generation(e) => {
                e.is_cancelled()
            }
            _ => false,
        }
    }

    /// Whether the failure must stop the process (ingestion/startup errors).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RagError::Parse(_)
                | RagError::Embedding(_)
                | RagError::Index(_)
                | RagError::EmptyCorpus(_)
                | RagError::DuplicateRetriever(_)
                | RagError::Config(_)
        )
    }
}
