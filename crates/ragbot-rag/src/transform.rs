//! Query transformers applied before retrieval.
//!
//! Every transformer is infallible from the caller's point of view: when the
//! model call fails or answers nothing usable, the original question is used.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use ragbot_config::{QueryTransform, RetrievalConfig};
use ragbot_hooks::{HookRegistry, RagEvent};
use ragbot_providers::{ChatOptions, ChatProvider};
use ragbot_types::{ConversationTurn, Query, Role};

use crate::merge::normalize_text;

/// Default number of rephrasings produced by [`ExpandingTransformer`].
pub const DEFAULT_EXPANSIONS: usize = 3;

const COMPRESS_TEMPLATE: &str = "Read the conversation between the User and the AI, then the new query from the User. \
Reformulate the new query into one clear, concise and self-contained query suitable for \
information retrieval, resolving every reference to the conversation.

Conversation:
{conversation}

User query: {query}

Reply with the reformulated query only, without any prefix.";

const EXPAND_TEMPLATE: &str = "Generate {n} different versions of the user query below. Each version must keep \
the original meaning but use other words or another sentence structure. They will be used \
to retrieve relevant documents.
Write each version on its own line, without numbering, hyphens or any other formatting.

User query: {query}";

static ENUMERATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[-*•]+|\(?\d+[.):])\s*").expect("valid regex"));

/// Queries to run against the retrievers for one question.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedQuery {
    /// The question as the user asked it.
    pub original: String,
    /// Non-empty list of retrieval queries.
    pub queries: Vec<String>,
}

impl TransformedQuery {
    pub fn identity(query: &Query) -> Self {
        Self {
            original: query.text.clone(),
            queries: vec![query.text.clone()],
        }
    }

    /// Build from candidate queries, dropping blanks and near-duplicates.
    ///
    /// Falls back to the original question when nothing is left.
    pub fn from_candidates(original: &str, candidates: impl IntoIterator<Item = String>) -> Self {
        let mut seen = HashSet::new();
        let queries: Vec<String> = candidates
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty() && seen.insert(normalize_text(c)))
            .collect();

        Self {
            original: original.to_string(),
            queries: if queries.is_empty() {
                vec![original.to_string()]
            } else {
                queries
            },
        }
    }

    pub fn is_identity(&self) -> bool {
        self.queries.len() == 1 && self.queries[0] == self.original
    }
}

#[async_trait]
pub trait QueryTransformer: Send + Sync {
    async fn transform(&self, query: &Query) -> TransformedQuery;
}

/// Passes the question through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityTransformer;

#[async_trait]
impl QueryTransformer for IdentityTransformer {
    async fn transform(&self, query: &Query) -> TransformedQuery {
        TransformedQuery::identity(query)
    }
}

/// Rewrites a follow-up question into a standalone one using the conversation.
pub struct CompressingTransformer {
    chat: Arc<dyn ChatProvider>,
    options: ChatOptions,
    hooks: Arc<HookRegistry>,
}

impl CompressingTransformer {
    pub fn new(chat: Arc<dyn ChatProvider>, options: ChatOptions, hooks: Arc<HookRegistry>) -> Self {
        Self {
            chat,
            options,
            hooks,
        }
    }
}

#[async_trait]
impl QueryTransformer for CompressingTransformer {
    async fn transform(&self, query: &Query) -> TransformedQuery {
        if query.history.is_empty() {
            return TransformedQuery::identity(query);
        }

        let prompt = COMPRESS_TEMPLATE
            .replace("{conversation}", &format_conversation(&query.history))
            .replace("{query}", &query.text);

        match self.chat.complete(&prompt, &[], &self.options).await {
            Ok(reply) => {
                let compressed = reply.trim();
                if compressed.is_empty() {
                    return TransformedQuery::identity(query);
                }
                TransformedQuery {
                    original: query.text.clone(),
                    queries: vec![compressed.to_string()],
                }
            }
            Err(e) => {
                self.hooks.emit(RagEvent::TransformFailed {
                    error: e.to_string(),
                });
                TransformedQuery::identity(query)
            }
        }
    }
}

/// Produces several rephrasings of the question alongside the original.
pub struct ExpandingTransformer {
    chat: Arc<dyn ChatProvider>,
    options: ChatOptions,
    expansions: usize,
    hooks: Arc<HookRegistry>,
}

impl ExpandingTransformer {
    pub fn new(chat: Arc<dyn ChatProvider>, options: ChatOptions, hooks: Arc<HookRegistry>) -> Self {
        Self {
            chat,
            options,
            expansions: DEFAULT_EXPANSIONS,
            hooks,
        }
    }

    pub fn with_expansions(mut self, expansions: usize) -> Self {
        self.expansions = expansions.max(1);
        self
    }
}

#[async_trait]
impl QueryTransformer for ExpandingTransformer {
    async fn transform(&self, query: &Query) -> TransformedQuery {
        let prompt = EXPAND_TEMPLATE
            .replace("{n}", &self.expansions.to_string())
            .replace("{query}", &query.text);

        match self.chat.complete(&prompt, &[], &self.options).await {
            Ok(reply) => {
                let variants = reply
                    .lines()
                    .map(strip_enumeration)
                    .filter(|l| !l.is_empty())
                    .take(self.expansions)
                    .collect::<Vec<_>>();
                TransformedQuery::from_candidates(
                    &query.text,
                    std::iter::once(query.text.clone()).chain(variants),
                )
            }
            Err(e) => {
                self.hooks.emit(RagEvent::TransformFailed {
                    error: e.to_string(),
                });
                TransformedQuery::identity(query)
            }
        }
    }
}

/// Runs `second` on every query produced by `first`.
pub struct ChainedTransformer {
    first: Arc<dyn QueryTransformer>,
    second: Arc<dyn QueryTransformer>,
}

impl ChainedTransformer {
    pub fn new(first: Arc<dyn QueryTransformer>, second: Arc<dyn QueryTransformer>) -> Self {
        Self { first, second }
    }
}

#[async_trait]
impl QueryTransformer for ChainedTransformer {
    async fn transform(&self, query: &Query) -> TransformedQuery {
        let intermediate = self.first.transform(query).await;

        let mut candidates = Vec::new();
        for text in intermediate.queries {
            let next = Query::with_history(text, query.history.clone());
            candidates.extend(self.second.transform(&next).await.queries);
        }
        TransformedQuery::from_candidates(&query.text, candidates)
    }
}

/// Build the transformer selected by `config.transformer`.
pub fn transformer_from_config(
    config: &RetrievalConfig,
    chat: Arc<dyn ChatProvider>,
    options: ChatOptions,
    hooks: Arc<HookRegistry>,
) -> Arc<dyn QueryTransformer> {
    let compress = || CompressingTransformer::new(chat.clone(), options.clone(), hooks.clone());
    let expand = || {
        ExpandingTransformer::new(chat.clone(), options.clone(), hooks.clone())
            .with_expansions(config.expansions)
    };
    match config.transformer {
        QueryTransform::Identity => Arc::new(IdentityTransformer),
        QueryTransform::Compress => Arc::new(compress()),
        QueryTransform::Expand => Arc::new(expand()),
        QueryTransform::Chain => Arc::new(ChainedTransformer::new(
            Arc::new(compress()),
            Arc::new(expand()),
        )),
    }
}

fn format_conversation(history: &[ConversationTurn]) -> String {
    history
        .iter()
        .map(|turn| match turn.role {
            Role::User => format!("User: {}", turn.content),
            Role::Assistant => format!("AI: {}", turn.content),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn strip_enumeration(line: &str) -> String {
    ENUMERATION_RE
        .replace(line, "")
        .trim()
        .trim_matches('"')
        .trim()
        .to_string()
}
