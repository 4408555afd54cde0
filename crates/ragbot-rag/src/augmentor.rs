//! Retrieval augmentation: transform, route, retrieve, merge and render.

use std::sync::Arc;

use futures::future::join_all;

use ragbot_hooks::{HookRegistry, RagEvent};
use ragbot_types::{ContextStatus, ConversationTurn, Query, ScoredSegment};

use crate::merge::merge_results;
use crate::retriever::RegisteredRetriever;
use crate::router::QueryRouter;
use crate::transform::{IdentityTransformer, QueryTransformer};

const CONTEXT_HEADER: &str = "Answer using the following information:";

/// A question with the context retrieved for it.
#[derive(Debug, Clone)]
pub struct AugmentedPrompt {
    pub question: String,
    /// Merged segments, best first.
    pub contents: Vec<ScoredSegment>,
    /// Memory window the question was asked in.
    pub history: Vec<ConversationTurn>,
    pub status: ContextStatus,
}

impl AugmentedPrompt {
    /// Prompt without any retrieval, for plain chat.
    pub fn bare(question: &str, history: Vec<ConversationTurn>) -> Self {
        Self {
            question: question.to_string(),
            contents: Vec::new(),
            history,
            status: ContextStatus::Disabled,
        }
    }

    /// The user message sent to the chat model.
    pub fn user_message(&self) -> String {
        if self.contents.is_empty() {
            return self.question.clone();
        }

        let blocks = self
            .contents
            .iter()
            .map(|s| format!("[source: {}]\n{}", s.segment.source_id, s.segment.text))
            .collect::<Vec<_>>()
            .join("\n\n");
        format!("{}\n\n{CONTEXT_HEADER}\n{blocks}", self.question)
    }

    /// Distinct source ids of the context, in rank order.
    pub fn sources(&self) -> Vec<String> {
        let mut sources: Vec<String> = Vec::new();
        for scored in &self.contents {
            if !sources.contains(&scored.segment.source_id) {
                sources.push(scored.segment.source_id.clone());
            }
        }
        sources
    }
}

/// Gathers context for a question from the retrievers its router selects.
pub struct RetrievalAugmentor {
    router: Arc<dyn QueryRouter>,
    transformer: Arc<dyn QueryTransformer>,
    max_results: usize,
    hooks: Arc<HookRegistry>,
}

impl RetrievalAugmentor {
    /// `max_results` caps the merged context across all retrievers and queries.
    pub fn new(router: Arc<dyn QueryRouter>, max_results: usize, hooks: Arc<HookRegistry>) -> Self {
        Self {
            router,
            transformer: Arc::new(IdentityTransformer),
            max_results,
            hooks,
        }
    }

    pub fn with_transformer(mut self, transformer: Arc<dyn QueryTransformer>) -> Self {
        self.transformer = transformer;
        self
    }

    pub async fn augment(&self, question: &str, history: &[ConversationTurn]) -> AugmentedPrompt {
        let query = Query::with_history(question, history.to_vec());
        let transformed = self.transformer.transform(&query).await;
        if !transformed.is_identity() {
            self.hooks.emit(RagEvent::QueryTransformed {
                original: transformed.original.clone(),
                queries: transformed.queries.clone(),
            });
        }

        // Pair every query with the retrievers selected for it
        let sources = self.router.sources();
        let mut calls: Vec<(&RegisteredRetriever, String)> = Vec::new();
        for text in transformed.queries {
            let decision = self
                .router
                .route(&Query::with_history(text.clone(), history.to_vec()))
                .await;
            for id in &decision.retrievers {
                if let Some(entry) = sources.get(id) {
                    calls.push((entry, text.clone()));
                }
            }
        }

        let outcomes = join_all(calls.iter().map(|(entry, text)| {
            entry
                .retriever
                .retrieve(text, entry.limits.max_results, entry.limits.min_score)
        }))
        .await;

        let mut results = Vec::new();
        let mut failures = 0;
        for ((entry, _), outcome) in calls.iter().zip(outcomes) {
            match outcome {
                Ok(result) => results.push(result),
                Err(e) => {
                    failures += 1;
                    self.hooks.emit(RagEvent::RetrieverFailed {
                        retriever: entry.id().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let contents = merge_results(results, self.max_results);
        let status = if !calls.is_empty() && failures == calls.len() {
            ContextStatus::AllSourcesFailed
        } else if contents.is_empty() {
            ContextStatus::Empty
        } else {
            ContextStatus::Found
        };
        self.hooks.emit(RagEvent::ContextAssembled {
            segments: contents.len(),
            status,
        });

        AugmentedPrompt {
            question: question.to_string(),
            contents,
            history: history.to_vec(),
            status,
        }
    }
}
