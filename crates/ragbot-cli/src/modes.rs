//! The interactive operating modes.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::Instrument;

use ragbot_config::RagConfig;
use ragbot_rag::{
    Assistant, CompressingTransformer, LanguageModelRouter, LocalIndexRetriever, MultiRouter,
    RetrievalAugmentor, RetrievalLimits, RetrieverSet, SingleRouter, VectorIndex,
    WebSearchRetriever,
};

use crate::repl::{Console, ask};
use crate::session::Session;

const CHAT_LIMITS: RetrievalLimits = RetrievalLimits {
    max_results: 3,
    min_score: 0.7,
};
const ADVANCED_LIMITS: RetrievalLimits = RetrievalLimits {
    max_results: 5,
    min_score: 0.3,
};
const BASIC_LIMITS: RetrievalLimits = RetrievalLimits {
    max_results: 2,
    min_score: 0.5,
};
const HYBRID_LOCAL_LIMITS: RetrievalLimits = RetrievalLimits {
    max_results: 3,
    min_score: 0.5,
};

/// Label of the local collection in single-collection modes.
const DOCS_ID: &str = "documents";

/// Naive RAG over one collection.
pub async fn run_chat(
    config: RagConfig,
    docs: Vec<PathBuf>,
    max_results: Option<usize>,
    min_score: Option<f32>,
) -> Result<()> {
    let session = Session::start(config)?;
    let span = tracing::info_span!("session", id = %session.id, mode = "chat");
    async move {
        let paths = session.document_paths(docs)?;
        let index = session.ingest(DOCS_ID, &paths).await?;

        let limits = RetrievalLimits::new(
            max_results.unwrap_or(CHAT_LIMITS.max_results),
            min_score.unwrap_or(CHAT_LIMITS.min_score),
        );
        let router = SingleRouter::new(local_retriever(&session, DOCS_ID, index), limits);
        let augmentor =
            RetrievalAugmentor::new(Arc::new(router), limits.max_results, session.hooks.clone())
                .with_transformer(session.transformer());
        let mut assistant = session.assistant().with_augmentor(augmentor);

        println!("\nragbot chat (model: {})", session.config.chat.model);
        println!("Ask a question, or type 'exit' or Ctrl+D to quit.");
        question_loop(&session, &mut assistant, "Assistant", false).await
    }
    .instrument(span)
    .await
}

/// One collection per configured source, chosen per question by the model.
pub async fn run_route(config: RagConfig) -> Result<()> {
    if config.sources.is_empty() {
        return Err(ragbot_config::ConfigError::NoSources)
            .context("Route mode needs `sources` in the config file");
    }

    let session = Session::start(config)?;
    let span = tracing::info_span!("session", id = %session.id, mode = "route");
    async move {
        let limits = RetrievalLimits::from_config(&session.config.retrieval);
        let mut sources = RetrieverSet::new();
        for source in &session.config.sources {
            let index = session
                .ingest(&source.name, std::slice::from_ref(&source.path))
                .await?;
            sources.register(
                local_retriever(&session, &source.name, index),
                source.description.clone(),
                limits,
            )?;
        }

        let router = LanguageModelRouter::new(
            sources,
            session.chat.clone(),
            session.control_options(),
            session.hooks.clone(),
        );
        let augmentor =
            RetrievalAugmentor::new(Arc::new(router), limits.max_results, session.hooks.clone())
                .with_transformer(session.transformer());
        let mut assistant = session.assistant().with_augmentor(augmentor);

        let names: Vec<&str> = session.config.sources.iter().map(|s| s.name.as_str()).collect();
        println!("\nragbot route: {}", names.join(", "));
        println!("Ask a question, or type 'exit' or Ctrl+D to quit.");
        question_loop(&session, &mut assistant, "Assistant", false).await
    }
    .instrument(span)
    .await
}

/// Which assistant(s) answer in advanced mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Selection {
    Advanced,
    Basic,
    Compare,
}

impl Selection {
    fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "1" => Some(Selection::Advanced),
            "2" => Some(Selection::Basic),
            "3" => Some(Selection::Compare),
            _ => None,
        }
    }
}

/// Query compression versus plain retrieval over the same collection.
pub async fn run_advanced(config: RagConfig, docs: Vec<PathBuf>) -> Result<()> {
    let session = Session::start(config)?;
    let span = tracing::info_span!("session", id = %session.id, mode = "advanced");
    async move {
        let paths = session.document_paths(docs)?;
        let index = session.ingest(DOCS_ID, &paths).await?;

        let compressing = CompressingTransformer::new(
            session.chat.clone(),
            session.control_options(),
            session.hooks.clone(),
        );
        let router = SingleRouter::new(
            local_retriever(&session, DOCS_ID, index.clone()),
            ADVANCED_LIMITS,
        );
        let augmentor = RetrievalAugmentor::new(
            Arc::new(router),
            ADVANCED_LIMITS.max_results,
            session.hooks.clone(),
        )
        .with_transformer(Arc::new(compressing));
        let mut advanced = session.assistant().with_augmentor(augmentor);
        let mut basic = basic_assistant(&session, index, BASIC_LIMITS);

        println!("\nChoose a mode:");
        println!("1. Advanced assistant (query compression)");
        println!("2. Basic assistant");
        println!("3. Compare both");

        let mut console = Console::new(session.cancel.clone());
        loop {
            let Some(choice) = console.read("\nMode (1/2/3) or 'exit': ").await? else {
                break;
            };
            let Some(selection) = Selection::parse(&choice) else {
                println!("Invalid mode. Choose 1, 2, 3 or 'exit'.");
                continue;
            };
            let Some(question) = console.read("Question: ").await? else {
                break;
            };

            let keep_going = match selection {
                Selection::Advanced => ask(&mut advanced, "Advanced", &question, false).await,
                Selection::Basic => ask(&mut basic, "Basic", &question, false).await,
                Selection::Compare => {
                    ask(&mut advanced, "Advanced", &question, false).await
                        && ask(&mut basic, "Basic", &question, false).await
                }
            };
            if !keep_going {
                break;
            }
        }

        println!("Goodbye!");
        Ok::<_, anyhow::Error>(())
    }
    .instrument(span)
    .await
}

/// Local collection and live web search, merged.
pub async fn run_hybrid(config: RagConfig, docs: Vec<PathBuf>) -> Result<()> {
    let session = Session::start(config)?;
    let span = tracing::info_span!("session", id = %session.id, mode = "hybrid");
    async move {
        let web = session.web_search()?;
        let paths = session.document_paths(docs)?;
        let index = session.ingest(DOCS_ID, &paths).await?;

        let web_limits = RetrievalLimits::new(
            session.config.web_search.max_results,
            session.config.web_search.min_score,
        );
        let sources = RetrieverSet::new()
            .with(
                local_retriever(&session, DOCS_ID, index),
                "Local documents",
                HYBRID_LOCAL_LIMITS,
            )?
            .with(
                Arc::new(WebSearchRetriever::new("web", web)),
                "Live web search",
                web_limits,
            )?;
        let augmentor = RetrievalAugmentor::new(
            Arc::new(MultiRouter::new(sources)),
            session.config.retrieval.merge_ceiling,
            session.hooks.clone(),
        )
        .with_transformer(session.transformer());
        let mut assistant = session.assistant().with_augmentor(augmentor);

        println!("\nragbot hybrid: local documents + web search");
        println!("Ask a question, or type 'exit' or Ctrl+D to quit.");
        question_loop(&session, &mut assistant, "Assistant", true).await
    }
    .instrument(span)
    .await
}

fn local_retriever(
    session: &Session,
    id: &str,
    index: Arc<VectorIndex>,
) -> Arc<LocalIndexRetriever> {
    Arc::new(LocalIndexRetriever::new(
        id,
        index,
        session.embedder.clone(),
        session.hooks.clone(),
    ))
}

fn basic_assistant(
    session: &Session,
    index: Arc<VectorIndex>,
    limits: RetrievalLimits,
) -> Assistant {
    let router = SingleRouter::new(local_retriever(session, DOCS_ID, index), limits);
    session.assistant().with_augmentor(RetrievalAugmentor::new(
        Arc::new(router),
        limits.max_results,
        session.hooks.clone(),
    ))
}

async fn question_loop(
    session: &Session,
    assistant: &mut Assistant,
    label: &str,
    timed: bool,
) -> Result<()> {
    let mut console = Console::new(session.cancel.clone());
    while let Some(question) = console.read("\nYou: ").await? {
        if !ask(assistant, label, &question, timed).await {
            break;
        }
    }
    println!("Goodbye!");
    Ok(())
}
