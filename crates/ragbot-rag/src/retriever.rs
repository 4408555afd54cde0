//! Content retrievers and the labelled set the routers choose from.

use std::sync::Arc;

use async_trait::async_trait;

use ragbot_config::RetrievalConfig;
use ragbot_hooks::{HookRegistry, RagEvent};
use ragbot_providers::{EmbeddingProvider, WebSearchProvider};
use ragbot_types::{RetrievalResult, ScoredSegment, Segment};

use crate::error::RagError;
use crate::index::VectorIndex;

/// Source id given to segments built from web search hits.
pub const WEB_SOURCE_ID: &str = "web";

/// Per-retriever result limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalLimits {
    pub max_results: usize,
    pub min_score: f32,
}

impl RetrievalLimits {
    pub fn new(max_results: usize, min_score: f32) -> Self {
        Self {
            max_results,
            min_score,
        }
    }

    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::new(config.max_results, config.min_score)
    }
}

impl Default for RetrievalLimits {
    fn default() -> Self {
        Self::from_config(&RetrievalConfig::default())
    }
}

/// A source of ranked segments.
///
/// Results are sorted by descending score, every score is at least
/// `min_score` and there are at most `max_results` of them.
#[async_trait]
pub trait ContentRetriever: Send + Sync {
    fn id(&self) -> &str;
    async fn retrieve(
        &self,
        query: &str,
        max_results: usize,
        min_score: f32,
    ) -> Result<RetrievalResult, RagError>;
}

/// Retrieves from an in-memory vector index.
pub struct LocalIndexRetriever {
    id: String,
    index: Arc<VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    hooks: Arc<HookRegistry>,
}

impl LocalIndexRetriever {
    pub fn new(
        id: impl Into<String>,
        index: Arc<VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        hooks: Arc<HookRegistry>,
    ) -> Self {
        Self {
            id: id.into(),
            index,
            embedder,
            hooks,
        }
    }
}

#[async_trait]
impl ContentRetriever for LocalIndexRetriever {
    fn id(&self) -> &str {
        &self.id
    }

    async fn retrieve(
        &self,
        query: &str,
        max_results: usize,
        min_score: f32,
    ) -> Result<RetrievalResult, RagError> {
        if self.index.is_empty() || max_results == 0 {
            return Ok(Vec::new());
        }

        // A failed query embedding yields no context rather than an error
        let embedding = match self.embedder.embed_query(query).await {
            Ok(embedding) => embedding,
            Err(e) => {
                self.hooks.emit(RagEvent::RetrieverFailed {
                    retriever: self.id.clone(),
                    error: e.to_string(),
                });
                return Ok(Vec::new());
            }
        };

        self.index
            .search(&embedding, max_results, min_score)
            .map_err(|e| RagError::Retrieval {
                retriever: self.id.clone(),
                reason: e.to_string(),
            })
    }
}

/// Retrieves live results from a web search service.
pub struct WebSearchRetriever {
    id: String,
    search: Arc<dyn WebSearchProvider>,
}

impl WebSearchRetriever {
    pub fn new(id: impl Into<String>, search: Arc<dyn WebSearchProvider>) -> Self {
        Self {
            id: id.into(),
            search,
        }
    }
}

#[async_trait]
impl ContentRetriever for WebSearchRetriever {
    fn id(&self) -> &str {
        &self.id
    }

    async fn retrieve(
        &self,
        query: &str,
        max_results: usize,
        min_score: f32,
    ) -> Result<RetrievalResult, RagError> {
        if max_results == 0 {
            return Ok(Vec::new());
        }

        let hits = self
            .search
            .search(query, max_results)
            .await
            .map_err(|e| RagError::Retrieval {
                retriever: self.id.clone(),
                reason: e.to_string(),
            })?;

        let mut results: Vec<ScoredSegment> = hits
            .into_iter()
            .enumerate()
            .map(|(rank, hit)| {
                let score = hit.score.unwrap_or(1.0 / (1.0 + rank as f32));
                let text = if hit.snippet.is_empty() {
                    hit.title.clone()
                } else {
                    hit.snippet
                };
                let segment = Segment::new(format!("{WEB_SOURCE_ID}::{rank}"), text, WEB_SOURCE_ID)
                    .with_metadata("url", hit.url)
                    .with_metadata("title", hit.title);
                ScoredSegment::new(segment, score)
            })
            .filter(|s| !s.segment.text.is_empty() && s.score >= min_score)
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(max_results);
        Ok(results)
    }
}

/// A retriever with the description routers show to the model and its limits.
#[derive(Clone)]
pub struct RegisteredRetriever {
    pub retriever: Arc<dyn ContentRetriever>,
    pub description: String,
    pub limits: RetrievalLimits,
}

impl RegisteredRetriever {
    pub fn id(&self) -> &str {
        self.retriever.id()
    }
}

/// Ordered set of retrievers keyed by their id.
#[derive(Clone, Default)]
pub struct RetrieverSet {
    entries: Vec<RegisteredRetriever>,
}

impl RetrieverSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A set holding exactly one retriever.
    pub fn single(
        retriever: Arc<dyn ContentRetriever>,
        description: impl Into<String>,
        limits: RetrievalLimits,
    ) -> Self {
        Self {
            entries: vec![RegisteredRetriever {
                retriever,
                description: description.into(),
                limits,
            }],
        }
    }

    /// Add a retriever; ids must be unique within the set.
    pub fn register(
        &mut self,
        retriever: Arc<dyn ContentRetriever>,
        description: impl Into<String>,
        limits: RetrievalLimits,
    ) -> Result<(), RagError> {
        let id = retriever.id().to_string();
        if self.get(&id).is_some() {
            return Err(RagError::DuplicateRetriever(id));
        }
        self.entries.push(RegisteredRetriever {
            retriever,
            description: description.into(),
            limits,
        });
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(
        mut self,
        retriever: Arc<dyn ContentRetriever>,
        description: impl Into<String>,
        limits: RetrievalLimits,
    ) -> Result<Self, RagError> {
        self.register(retriever, description, limits)?;
        Ok(self)
    }

    pub fn get(&self, id: &str) -> Option<&RegisteredRetriever> {
        self.entries.iter().find(|e| e.id() == id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.id().to_string()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredRetriever> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CannedWebSearch, KeywordEmbedder, StaticRetriever, web_hit};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn animals_index() -> Arc<VectorIndex> {
        let mut index = VectorIndex::new();
        index
            .add(Segment::new("a::0", "Cats are mammals", "a.md"), vec![1.0, 0.0])
            .unwrap();
        index
            .add(Segment::new("a::1", "Dogs bark", "a.md"), vec![0.0, 1.0])
            .unwrap();
        Arc::new(index)
    }

    #[tokio::test]
    async fn test_local_retriever_cats() {
        let retriever = LocalIndexRetriever::new(
            "animals",
            animals_index(),
            Arc::new(KeywordEmbedder::new(&["cat", "dog"])),
            Arc::new(HookRegistry::new()),
        );
        let results = retriever.retrieve("Tell me about cats", 1, 0.5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].segment.text, "Cats are mammals");
    }

    #[tokio::test]
    async fn test_local_retriever_embedding_failure_is_empty() {
        let hooks = Arc::new(HookRegistry::new());
        let failures = Arc::new(AtomicUsize::new(0));
        let counter = failures.clone();
        hooks.on(
            "retriever_failed",
            Arc::new(move |_: &RagEvent| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let retriever = LocalIndexRetriever::new(
            "animals",
            animals_index(),
            Arc::new(KeywordEmbedder::new(&["cat", "dog"]).failing_on("cats")),
            hooks,
        );
        let results = retriever.retrieve("cats?", 3, 0.0).await.unwrap();
        assert!(results.is_empty());
        assert_eq!(failures.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_local_retriever_dimension_mismatch_is_error() {
        let retriever = LocalIndexRetriever::new(
            "animals",
            animals_index(),
            Arc::new(KeywordEmbedder::new(&["cat", "dog", "bird"])),
            Arc::new(HookRegistry::new()),
        );
        let err = retriever.retrieve("cats", 3, 0.0).await.unwrap_err();
        assert!(matches!(err, RagError::Retrieval { .. }));
    }

    #[tokio::test]
    async fn test_web_retriever_scores() {
        let search = CannedWebSearch::new(vec![
            web_hit("First", "first snippet", None),
            web_hit("Second", "second snippet", Some(0.9)),
            web_hit("Third", "third snippet", None),
        ]);
        let retriever = WebSearchRetriever::new("web", Arc::new(search));
        let results = retriever.retrieve("anything", 3, 0.0).await.unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].segment.text, "first snippet");
        assert_eq!(results[0].score, 1.0);
        assert_eq!(results[1].score, 0.9);
        assert_eq!(results[2].score, 1.0 / 3.0);
        assert!(results.iter().all(|r| r.segment.source_id == WEB_SOURCE_ID));
        assert_eq!(
            results[0].segment.metadata.get("url").map(String::as_str),
            Some("https://example.org/first")
        );
    }

    #[tokio::test]
    async fn test_web_retriever_min_score() {
        let search = CannedWebSearch::new(vec![
            web_hit("First", "a", None),
            web_hit("Second", "b", None),
        ]);
        let retriever = WebSearchRetriever::new("web", Arc::new(search));
        let results = retriever.retrieve("q", 3, 0.6).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_web_retriever_failure() {
        let retriever = WebSearchRetriever::new("web", Arc::new(CannedWebSearch::failing()));
        let err = retriever.retrieve("q", 3, 0.0).await.unwrap_err();
        assert!(matches!(err, RagError::Retrieval { ref retriever, .. } if retriever == "web"));
    }

    #[test]
    fn test_retriever_set_rejects_duplicates() {
        let mut set = RetrieverSet::new();
        set.register(
            Arc::new(StaticRetriever::new("recipes", &[])),
            "Cooking recipes",
            RetrievalLimits::default(),
        )
        .unwrap();
        let err = set
            .register(
                Arc::new(StaticRetriever::new("recipes", &[])),
                "Again",
                RetrievalLimits::default(),
            )
            .unwrap_err();
        assert!(matches!(err, RagError::DuplicateRetriever(_)));
        assert_eq!(set.ids(), vec!["recipes"]);
        assert_eq!(set.get("recipes").unwrap().description, "Cooking recipes");
    }

    #[test]
    fn test_single_retriever_set() {
        let set = RetrieverSet::single(
            Arc::new(StaticRetriever::new("docs", &[])),
            "Docs",
            RetrievalLimits::new(2, 0.5),
        );
        assert_eq!(set.ids(), vec!["docs"]);
        assert_eq!(set.get("docs").unwrap().limits.max_results, 2);
    }
}
