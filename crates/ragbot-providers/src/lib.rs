//! ragbot-providers: The remote and file-system collaborators of the RAG core.
//!
//! Provides:
//! - Embedding providers (Gemini, OpenAI)
//! - Chat completion providers (Gemini, OpenAI)
//! - Web search (Tavily)
//! - Plain text / Markdown / HTML document parsing
//! - A `Resilient` wrapper adding deadlines, bounded retry and cancellation

pub mod chat;
pub mod embeddings;
pub mod error;
mod http;
pub mod parser;
pub mod resilience;
pub mod web_search;

pub use chat::{ChatOptions, ChatProvider, GeminiChat, OpenAiChat};
pub use embeddings::{EmbeddingProvider, GeminiEmbedding, OpenAiEmbedding};
pub use error::ProviderError;
pub use parser::{DocumentParser, PlainTextParser, collect_documents};
pub use resilience::{Resilient, RetryPolicy, with_retry};
pub use web_search::{TavilySearch, WebSearchProvider};
