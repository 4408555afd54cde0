//! Query routers: choose which retrievers serve a query.

use std::sync::Arc;

use async_trait::async_trait;

use ragbot_hooks::{HookRegistry, RagEvent};
use ragbot_providers::{ChatOptions, ChatProvider};
use ragbot_types::{Query, RouteDecision};

use crate::retriever::{ContentRetriever, RetrievalLimits, RetrieverSet};

const ROUTE_TEMPLATE: &str = "Based on the user query, choose the most suitable data source(s) \
to retrieve relevant information from, among the following options:
{options}
Answer with the number or label of each suitable option, separated by commas, and nothing else. \
Answer none if no option applies.

User query: {query}";

/// Selects retrievers for a query. Routing never mutates the retrievers.
#[async_trait]
pub trait QueryRouter: Send + Sync {
    /// Every retriever this router can select.
    fn sources(&self) -> &RetrieverSet;
    async fn route(&self, query: &Query) -> RouteDecision;
}

/// Always selects its only retriever.
pub struct SingleRouter {
    sources: RetrieverSet,
}

impl SingleRouter {
    pub fn new(retriever: Arc<dyn ContentRetriever>, limits: RetrievalLimits) -> Self {
        Self {
            sources: RetrieverSet::single(retriever, String::new(), limits),
        }
    }
}

#[async_trait]
impl QueryRouter for SingleRouter {
    fn sources(&self) -> &RetrieverSet {
        &self.sources
    }

    async fn route(&self, _query: &Query) -> RouteDecision {
        RouteDecision::new(self.sources.ids())
    }
}

/// Always selects every retriever; their results are merged downstream.
pub struct MultiRouter {
    sources: RetrieverSet,
}

impl MultiRouter {
    pub fn new(sources: RetrieverSet) -> Self {
        Self { sources }
    }
}

#[async_trait]
impl QueryRouter for MultiRouter {
    fn sources(&self) -> &RetrieverSet {
        &self.sources
    }

    async fn route(&self, _query: &Query) -> RouteDecision {
        RouteDecision::new(self.sources.ids())
    }
}

/// Asks the chat model which retrievers match the query, from their descriptions.
///
/// An answer naming no known retriever, or a failed call, selects the full set.
pub struct LanguageModelRouter {
    sources: RetrieverSet,
    chat: Arc<dyn ChatProvider>,
    options: ChatOptions,
    hooks: Arc<HookRegistry>,
}

impl LanguageModelRouter {
    pub fn new(
        sources: RetrieverSet,
        chat: Arc<dyn ChatProvider>,
        options: ChatOptions,
        hooks: Arc<HookRegistry>,
    ) -> Self {
        Self {
            sources,
            chat,
            options,
            hooks,
        }
    }

    fn prompt(&self, query: &str) -> String {
        let options = self
            .sources
            .iter()
            .enumerate()
            .map(|(i, entry)| format!("{}: {} ({})", i + 1, entry.id(), entry.description))
            .collect::<Vec<_>>()
            .join("\n");
        ROUTE_TEMPLATE
            .replace("{options}", &options)
            .replace("{query}", query)
    }

    fn selected(&self, query: &str, decision: RouteDecision, fallback: bool) -> RouteDecision {
        self.hooks.emit(RagEvent::RouteSelected {
            query: query.to_string(),
            retrievers: decision.retrievers.clone(),
            fallback,
        });
        decision
    }
}

#[async_trait]
impl QueryRouter for LanguageModelRouter {
    fn sources(&self) -> &RetrieverSet {
        &self.sources
    }

    async fn route(&self, query: &Query) -> RouteDecision {
        if self.sources.len() <= 1 {
            return RouteDecision::new(self.sources.ids());
        }

        let answer = match self
            .chat
            .complete(&self.prompt(&query.text), &[], &self.options)
            .await
        {
            Ok(answer) => answer,
            Err(_) => {
                return self.selected(&query.text, RouteDecision::new(self.sources.ids()), true);
            }
        };

        match parse_route(&answer, &self.sources) {
            Some(decision) => self.selected(&query.text, decision, false),
            None => self.selected(&query.text, RouteDecision::new(self.sources.ids()), true),
        }
    }
}

/// Parse a classification answer into retriever ids.
///
/// The answer lists labels (case-insensitive, possibly several words long) or
/// 1-based option numbers separated by commas, semicolons or whitespace;
/// unknown words are ignored. Returns `None` when nothing is recognised, and an
/// empty decision for the answer `none`.
pub(crate) fn parse_route(answer: &str, sources: &RetrieverSet) -> Option<RouteDecision> {
    let ids = sources.ids();
    let tokens = words(answer);

    if tokens.len() == 1 && tokens[0] == "none" {
        return Some(RouteDecision::none());
    }

    // Longest labels first so "easy recipes" wins over "recipes"
    let mut labels: Vec<(Vec<String>, &String)> = ids
        .iter()
        .map(|id| (words(id), id))
        .filter(|(label, _)| !label.is_empty())
        .collect();
    labels.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    let mut selected: Vec<String> = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let label = labels
            .iter()
            .find(|(label, _)| tokens[i..].starts_with(label.as_slice()));
        let (id, width) = match label {
            Some((label, id)) => (Some(*id), label.len()),
            None => match tokens[i].parse::<usize>() {
                Ok(n) if n >= 1 && n <= ids.len() => (Some(&ids[n - 1]), 1),
                _ => (None, 1),
            },
        };
        if let Some(id) = id {
            if !selected.contains(id) {
                selected.push(id.clone());
            }
        }
        i += width;
    }

    (!selected.is_empty()).then(|| RouteDecision::new(selected))
}

/// Lowercased words with surrounding punctuation removed.
fn words(text: &str) -> Vec<String> {
    text.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .map(|t| {
            t.trim_matches(|c: char| !c.is_alphanumeric() && c != '_' && c != '-')
                .to_lowercase()
        })
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedChat, StaticRetriever};

    fn sources() -> RetrieverSet {
        RetrieverSet::new()
            .with(
                Arc::new(StaticRetriever::new("animals", &[])),
                "Facts about pets and wild animals",
                RetrievalLimits::new(3, 0.5),
            )
            .unwrap()
            .with(
                Arc::new(StaticRetriever::new("recipes", &[])),
                "Cooking recipes and baking tips",
                RetrievalLimits::new(3, 0.5),
            )
            .unwrap()
            .with(
                Arc::new(StaticRetriever::new("rust", &[])),
                "The Rust programming language",
                RetrievalLimits::new(3, 0.5),
            )
            .unwrap()
    }

    fn router(chat: Arc<ScriptedChat>) -> LanguageModelRouter {
        LanguageModelRouter::new(
            sources(),
            chat,
            ChatOptions::new("test-model", 0.0),
            Arc::new(HookRegistry::new()),
        )
    }

    #[test]
    fn test_parse_route_labels_and_numbers() {
        let set = sources();
        assert_eq!(parse_route("recipes", &set).unwrap().retrievers, vec!["recipes"]);
        assert_eq!(
            parse_route("1, 3", &set).unwrap().retrievers,
            vec!["animals", "rust"]
        );
        assert_eq!(
            parse_route("Recipes; animals recipes", &set).unwrap().retrievers,
            vec!["recipes", "animals"]
        );
        assert_eq!(parse_route("2.", &set).unwrap().retrievers, vec!["recipes"]);
    }

    #[test]
    fn test_parse_route_multi_word_labels() {
        let set = RetrieverSet::new()
            .with(
                Arc::new(StaticRetriever::new("course notes", &[])),
                "Lecture notes",
                RetrievalLimits::default(),
            )
            .unwrap()
            .with(
                Arc::new(StaticRetriever::new("easy recipes", &[])),
                "Quick meals",
                RetrievalLimits::default(),
            )
            .unwrap()
            .with(
                Arc::new(StaticRetriever::new("recipes", &[])),
                "Every recipe",
                RetrievalLimits::default(),
            )
            .unwrap();

        assert_eq!(
            parse_route("easy recipes", &set).unwrap().retrievers,
            vec!["easy recipes"]
        );
        assert_eq!(
            parse_route("Course Notes, 3", &set).unwrap().retrievers,
            vec!["course notes", "recipes"]
        );
        assert!(parse_route("easy notes", &set).is_none());
    }

    #[test]
    fn test_parse_route_unknown_and_none() {
        let set = sources();
        assert!(parse_route("gardening, 7", &set).is_none());
        assert!(parse_route("", &set).is_none());
        assert!(parse_route("None", &set).unwrap().is_empty());
        assert_eq!(
            parse_route("astronomy, rust", &set).unwrap().retrievers,
            vec!["rust"]
        );
    }

    #[tokio::test]
    async fn test_routes_to_recipes() {
        let chat = Arc::new(ScriptedChat::new(vec![Ok("2")]));
        let router = router(chat.clone());
        let decision = router.route(&Query::new("How do I bake sourdough bread?")).await;
        assert_eq!(decision.retrievers, vec!["recipes"]);

        let prompt = chat.last_call().unwrap().prompt;
        assert!(prompt.contains("2: recipes (Cooking recipes and baking tips)"));
        assert!(prompt.contains("User query: How do I bake sourdough bread?"));
    }

    #[tokio::test]
    async fn test_ambiguous_answer_selects_all() {
        let router = router(Arc::new(ScriptedChat::new(vec![Ok("I am not sure")])));
        let decision = router.route(&Query::new("hello")).await;
        assert_eq!(decision.retrievers, vec!["animals", "recipes", "rust"]);
    }

    #[tokio::test]
    async fn test_failed_call_selects_all() {
        let router = router(Arc::new(ScriptedChat::new(vec![Err("timeout")])));
        let decision = router.route(&Query::new("hello")).await;
        assert_eq!(decision.retrievers.len(), 3);
    }

    #[tokio::test]
    async fn test_fallback_event() {
        let hooks = Arc::new(HookRegistry::new());
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        hooks.on(
            "route_selected",
            Arc::new(move |event: &RagEvent| {
                if let RagEvent::RouteSelected { fallback, .. } = event {
                    sink.lock().unwrap().push(*fallback);
                }
            }),
        );
        let router = LanguageModelRouter::new(
            sources(),
            Arc::new(ScriptedChat::new(vec![Ok("rust"), Ok("???")])),
            ChatOptions::new("test-model", 0.0),
            hooks,
        );
        router.route(&Query::new("borrow checker")).await;
        router.route(&Query::new("weather")).await;
        assert_eq!(*seen.lock().unwrap(), vec![false, true]);
    }

    #[tokio::test]
    async fn test_single_source_skips_model() {
        let chat = Arc::new(ScriptedChat::answering("1"));
        let set = RetrieverSet::new()
            .with(
                Arc::new(StaticRetriever::new("docs", &[])),
                "Docs",
                RetrievalLimits::default(),
            )
            .unwrap();
        let router = LanguageModelRouter::new(
            set,
            chat.clone(),
            ChatOptions::new("test-model", 0.0),
            Arc::new(HookRegistry::new()),
        );
        assert_eq!(router.route(&Query::new("q")).await.retrievers, vec!["docs"]);
        assert_eq!(chat.call_count(), 0);
    }

    #[tokio::test]
    async fn test_single_and_multi_routers() {
        let single = SingleRouter::new(
            Arc::new(StaticRetriever::new("docs", &[])),
            RetrievalLimits::new(3, 0.7),
        );
        assert_eq!(single.route(&Query::new("q")).await.retrievers, vec!["docs"]);
        assert_eq!(single.sources().get("docs").unwrap().limits.min_score, 0.7);

        let multi = MultiRouter::new(sources());
        assert_eq!(multi.route(&Query::new("q")).await.retrievers.len(), 3);
    }
}
