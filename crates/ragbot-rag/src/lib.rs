//! ragbot-rag: Retrieval-augmented question answering over document collections.
//!
//! Provides:
//! - Recursive paragraph/sentence/character chunking with overlap
//! - An in-memory cosine-similarity vector index
//! - Local index and web search retrievers behind one contract
//! - Query transformers (compressing, expanding) and routers (single, multi, model-classified)
//! - The retrieval augmentor, a bounded conversation memory and the assistant tying them together
//! - One-shot ingestion of files into an index

pub mod assistant;
pub mod augmentor;
pub mod chunking;
pub mod error;
pub mod index;
pub mod ingest;
pub mod memory;
pub mod merge;
pub mod retriever;
pub mod router;
pub mod transform;

#[cfg(test)]
pub(crate) mod testing;

pub use assistant::{Answer, Assistant};
pub use augmentor::{AugmentedPrompt, RetrievalAugmentor};
pub use chunking::Chunker;
pub use error::{IndexError, RagError};
pub use index::{IndexEntry, VectorIndex, cosine_similarity};
pub use ingest::{IngestSummary, ingest};
pub use memory::ConversationMemory;
pub use retriever::{
    ContentRetriever, LocalIndexRetriever, RegisteredRetriever, RetrievalLimits, RetrieverSet,
    WebSearchRetriever,
};
pub use router::{LanguageModelRouter, MultiRouter, QueryRouter, SingleRouter};
pub use transform::{
    ChainedTransformer, CompressingTransformer, ExpandingTransformer, IdentityTransformer,
    QueryTransformer, TransformedQuery, transformer_from_config,
};
