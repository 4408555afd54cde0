//! Pipeline event types.

use serde::{Deserialize, Serialize};

use ragbot_types::ContextStatus;

/// Events emitted by the retrieval pipeline and the assistant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RagEvent {
    /// A document has been chunked, embedded and indexed.
    Ingested {
        source_id: String,
        segments: usize,
    },
    /// A query transformer produced its output.
    QueryTransformed {
        original: String,
        queries: Vec<String>,
    },
    /// A query transformer failed and fell back to the original query.
    TransformFailed { error: String },
    /// A router selected retrievers for a query.
    RouteSelected {
        query: String,
        retrievers: Vec<String>,
        /// True when the full set was used because classification was ambiguous.
        fallback: bool,
    },
    /// One retrieval call failed and its source was skipped.
    RetrieverFailed { retriever: String, error: String },
    /// Retrieved segments have been merged into the prompt.
    ContextAssembled {
        segments: usize,
        status: ContextStatus,
    },
    /// The generative model call failed; memory was left untouched.
    GenerationFailed { error: String },
    /// A completed exchange was stored in memory.
    TurnRecorded { memory_len: usize },
}

impl RagEvent {
    /// Event type name used for handler routing.
    pub fn name(&self) -> &'static str {
        match self {
            RagEvent::Ingested { .. } => "ingested",
            RagEvent::QueryTransformed { .. } => "query_transformed",
            RagEvent::TransformFailed { .. } => "transform_failed",
            RagEvent::RouteSelected { .. } => "route_selected",
            RagEvent::RetrieverFailed { .. } => "retriever_failed",
            RagEvent::ContextAssembled { .. } => "context_assembled",
            RagEvent::GenerationFailed { .. } => "generation_failed",
            RagEvent::TurnRecorded { .. } => "turn_recorded",
        }
    }
}
