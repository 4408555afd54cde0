use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Fixed-length vector representing the meaning of a text.
pub type Embedding = Vec<f32>;

/// Ranked segments returned by a retriever, best first.
pub type RetrievalResult = Vec<ScoredSegment>;

// ──────────────────── Document Types ────────────────────

/// Text extracted from a source file, before chunking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Extracted text content.
    pub text: String,
    /// Stable identity of the source (usually the file name).
    pub source_id: String,
    /// Parser-provided metadata (path, format, ...).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl Document {
    pub fn new(text: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source_id: source_id.into(),
            metadata: HashMap::new(),
        }
    }
}

/// Immutable unit of retrievable text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Unique id within the index (e.g. "rag.pdf::4").
    pub id: String,
    /// The segment text.
    pub text: String,
    /// Source the segment came from ("web" for web search hits).
    pub source_id: String,
    /// Chunker/ingestion metadata (index, hash, path, ...).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl Segment {
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        source_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            source_id: source_id.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A segment together with its relevance score (higher is better).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredSegment {
    pub segment: Segment,
    pub score: f32,
}

impl ScoredSegment {
    pub fn new(segment: Segment, score: f32) -> Self {
        Self { segment, score }
    }
}

// ──────────────────── Conversation Types ────────────────────

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One message of the conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A user question together with the conversation it was asked in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<ConversationTurn>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            history: Vec::new(),
        }
    }

    pub fn with_history(text: impl Into<String>, history: Vec<ConversationTurn>) -> Self {
        Self {
            text: text.into(),
            history,
        }
    }
}

// ──────────────────── Routing Types ────────────────────

/// Retrievers selected for a query, identified by their labels.
///
/// Empty only when the router explicitly decided that no source applies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDecision {
    pub retrievers: Vec<String>,
}

impl RouteDecision {
    pub fn new(retrievers: Vec<String>) -> Self {
        Self { retrievers }
    }

    /// Explicit "no source applicable" decision.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.retrievers.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.retrievers.iter().any(|r| r == id)
    }
}

/// Outcome of context retrieval for one question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextStatus {
    /// At least one segment was placed in the prompt.
    Found,
    /// Retrieval succeeded but nothing passed the filters.
    Empty,
    /// Every retrieval call failed; the question is answered without context.
    AllSourcesFailed,
    /// No augmentor is configured.
    Disabled,
}

impl ContextStatus {
    pub fn has_context(&self) -> bool {
        matches!(self, Self::Found)
    }
}

// ──────────────────── Web Search Types ────────────────────

/// A single hit returned by a web search service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    /// Provider relevance score, when the service reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}
