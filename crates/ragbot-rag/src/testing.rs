//! In-crate fakes for the external collaborators.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use ragbot_providers::{ChatOptions, ChatProvider, EmbeddingProvider, ProviderError, WebSearchProvider};
use ragbot_types::{ConversationTurn, RetrievalResult, ScoredSegment, Segment, WebSearchResult};

use crate::error::RagError;
use crate::retriever::ContentRetriever;

pub(crate) fn unavailable(message: &str) -> ProviderError {
    ProviderError::Api {
        provider: "fake".into(),
        status: 503,
        message: message.into(),
    }
}

/// Embeds text as occurrence counts of a fixed vocabulary.
pub(crate) struct KeywordEmbedder {
    vocabulary: Vec<String>,
    fail_on: Option<String>,
    pub calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new(vocabulary: &[&str]) -> Self {
        Self {
            vocabulary: vocabulary.iter().map(|w| w.to_lowercase()).collect(),
            fail_on: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fail every batch containing a text with `needle`.
    pub fn failing_on(mut self, needle: &str) -> Self {
        self.fail_on = Some(needle.to_lowercase());
        self
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        self.vocabulary
            .iter()
            .map(|word| lower.matches(word.as_str()).count() as f32)
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn id(&self) -> &str {
        "keyword"
    }

    fn model(&self) -> &str {
        "keyword-counts"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(needle) = &self.fail_on {
            if texts.iter().any(|t| t.to_lowercase().contains(needle.as_str())) {
                return Err(unavailable("embedding service down"));
            }
        }
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }
}

/// A recorded `complete` call.
#[derive(Debug, Clone)]
pub(crate) struct ChatCall {
    pub prompt: String,
    pub history: Vec<ConversationTurn>,
    pub system_prompt: Option<String>,
}

/// Chat model answering from a script; `Err` entries fail with a 503.
pub(crate) struct ScriptedChat {
    replies: Mutex<VecDeque<Result<String, String>>>,
    fallback: Option<String>,
    pub calls: Mutex<Vec<ChatCall>>,
}

impl ScriptedChat {
    pub fn new(replies: Vec<Result<&str, &str>>) -> Self {
        Self {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
            fallback: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always answer `reply` once the script is exhausted.
    pub fn answering(reply: &str) -> Self {
        let mut chat = Self::new(Vec::new());
        chat.fallback = Some(reply.to_string());
        chat
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_call(&self) -> Option<ChatCall> {
        self.calls.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ChatProvider for ScriptedChat {
    fn id(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        prompt: &str,
        history: &[ConversationTurn],
        options: &ChatOptions,
    ) -> Result<String, ProviderError> {
        self.calls.lock().unwrap().push(ChatCall {
            prompt: prompt.to_string(),
            history: history.to_vec(),
            system_prompt: options.system_prompt.clone(),
        });
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(unavailable(&message)),
            None => self
                .fallback
                .clone()
                .ok_or_else(|| ProviderError::InvalidResponse("script exhausted".into())),
        }
    }
}

/// Retriever returning fixed segments, filtered by the requested limits.
pub(crate) struct StaticRetriever {
    id: String,
    hits: Vec<ScoredSegment>,
    fail: bool,
    pub queries: Mutex<Vec<String>>,
}

impl StaticRetriever {
    pub fn new(id: &str, hits: &[(&str, f32)]) -> Self {
        Self {
            id: id.to_string(),
            hits: hits
                .iter()
                .enumerate()
                .map(|(i, (text, score))| {
                    ScoredSegment::new(Segment::new(format!("{id}::{i}"), *text, id), *score)
                })
                .collect(),
            fail: false,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(id: &str) -> Self {
        let mut retriever = Self::new(id, &[]);
        retriever.fail = true;
        retriever
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentRetriever for StaticRetriever {
    fn id(&self) -> &str {
        &self.id
    }

    async fn retrieve(
        &self,
        query: &str,
        max_results: usize,
        min_score: f32,
    ) -> Result<RetrievalResult, RagError> {
        self.queries.lock().unwrap().push(query.to_string());
        if self.fail {
            return Err(RagError::Retrieval {
                retriever: self.id.clone(),
                reason: "source offline".into(),
            });
        }
        Ok(self
            .hits
            .iter()
            .filter(|h| h.score >= min_score)
            .take(max_results)
            .cloned()
            .collect())
    }
}

/// Web search returning canned hits, or failing when built with `failing`.
pub(crate) struct CannedWebSearch {
    results: Vec<WebSearchResult>,
    fail: bool,
}

impl CannedWebSearch {
    pub fn new(results: Vec<WebSearchResult>) -> Self {
        Self {
            results,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            results: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl WebSearchProvider for CannedWebSearch {
    fn id(&self) -> &str {
        "canned"
    }

    async fn search(
        &self,
        _query: &str,
        max_results: usize,
    ) -> Result<Vec<WebSearchResult>, ProviderError> {
        if self.fail {
            return Err(unavailable("search quota exceeded"));
        }
        Ok(self.results.iter().take(max_results).cloned().collect())
    }
}

pub(crate) fn web_hit(title: &str, snippet: &str, score: Option<f32>) -> WebSearchResult {
    WebSearchResult {
        title: title.to_string(),
        url: format!("https://example.org/{}", title.to_lowercase().replace(' ', "-")),
        snippet: snippet.to_string(),
        score,
    }
}
