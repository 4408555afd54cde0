//! Session bootstrap: credentials, resilient providers, cancellation, ingestion.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use ragbot_config::{ProviderKind, RagConfig, credential};
use ragbot_hooks::HookRegistry;
use ragbot_providers::{
    ChatOptions, ChatProvider, EmbeddingProvider, GeminiChat, GeminiEmbedding, OpenAiChat,
    OpenAiEmbedding, PlainTextParser, Resilient, RetryPolicy, TavilySearch, WebSearchProvider,
};
use ragbot_rag::{
    Assistant, Chunker, ConversationMemory, QueryTransformer, VectorIndex, ingest,
    transformer_from_config,
};

/// Everything the interactive modes share for one run.
pub struct Session {
    pub config: RagConfig,
    pub hooks: Arc<HookRegistry>,
    pub cancel: CancellationToken,
    pub chat: Arc<dyn ChatProvider>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub id: String,
}

impl Session {
    /// Resolve credentials and build the providers.
    ///
    /// Fails before any remote call when a required credential is missing.
    pub fn start(config: RagConfig) -> Result<Self> {
        let cancel = CancellationToken::new();
        let policy = RetryPolicy::from_config(&config.network);
        let chat = build_chat(&config, policy.clone(), cancel.clone())?;
        let embedder = build_embedder(&config, policy, cancel.clone())?;

        let ctrl_c = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupted, cancelling in-flight requests");
                ctrl_c.cancel();
            }
        });

        Ok(Self {
            config,
            hooks: Arc::new(HookRegistry::with_tracing()),
            cancel,
            chat,
            embedder,
            id: uuid::Uuid::new_v4().to_string(),
        })
    }

    /// Web search client; only modes that use it require its credential.
    pub fn web_search(&self) -> Result<Arc<dyn WebSearchProvider>> {
        let web = &self.config.web_search;
        let key = credential(&web.api_key_env)?;
        let mut search = TavilySearch::new(key);
        if let Some(url) = &web.base_url {
            search = search.with_base_url(url);
        }
        Ok(Arc::new(Resilient::new(
            search,
            RetryPolicy::from_config(&self.config.network),
            self.cancel.clone(),
        )))
    }

    /// Options for answering the user.
    pub fn answer_options(&self) -> ChatOptions {
        ChatOptions::new(&self.config.chat.model, self.config.chat.temperature)
            .with_system_prompt(self.config.chat.system_prompt.clone())
    }

    /// Options for auxiliary calls (query rewriting, routing).
    pub fn control_options(&self) -> ChatOptions {
        ChatOptions::new(&self.config.chat.model, 0.0)
    }

    /// The query transformer chosen by `retrieval.transformer`.
    pub fn transformer(&self) -> Arc<dyn QueryTransformer> {
        transformer_from_config(
            &self.config.retrieval,
            self.chat.clone(),
            self.control_options(),
            self.hooks.clone(),
        )
    }

    /// An assistant without retrieval, with a fresh memory window.
    pub fn assistant(&self) -> Assistant {
        Assistant::new(
            self.chat.clone(),
            self.answer_options(),
            ConversationMemory::from_config(&self.config.memory),
            self.hooks.clone(),
        )
    }

    /// Ingest `paths` into a new index.
    pub async fn ingest(&self, label: &str, paths: &[PathBuf]) -> Result<Arc<VectorIndex>> {
        println!("Indexing {label}...");
        let (index, summary) = ingest(
            paths,
            &PlainTextParser::new(),
            self.embedder.as_ref(),
            &Chunker::from_config(&self.config.chunking),
            self.config.embedding.batch_size,
            &self.hooks,
        )
        .await
        .with_context(|| format!("Failed to index {label}"))?;

        println!(
            "{label}: {} documents, {} segments ({} dimensions)",
            summary.documents, summary.segments, summary.dimensions
        );
        Ok(Arc::new(index))
    }

    /// Paths given on the command line, else every configured source.
    pub fn document_paths(&self, docs: Vec<PathBuf>) -> Result<Vec<PathBuf>> {
        if !docs.is_empty() {
            return Ok(docs);
        }
        if self.config.sources.is_empty() {
            return Err(ragbot_config::ConfigError::NoSources)
                .context("Pass --doc <path> or add `sources` to the config file");
        }
        Ok(self.config.sources.iter().map(|s| s.path.clone()).collect())
    }
}

fn build_chat(
    config: &RagConfig,
    policy: RetryPolicy,
    cancel: CancellationToken,
) -> Result<Arc<dyn ChatProvider>> {
    let chat = &config.chat;
    let key = credential(&chat.api_key_env)?;
    let provider: Arc<dyn ChatProvider> = match chat.provider {
        ProviderKind::Gemini => {
            let mut client = GeminiChat::new(key);
            if let Some(url) = &chat.base_url {
                client = client.with_base_url(url);
            }
            Arc::new(Resilient::new(client, policy, cancel))
        }
        ProviderKind::OpenAi => {
            let mut client = OpenAiChat::new(key);
            if let Some(url) = &chat.base_url {
                client = client.with_base_url(url);
            }
            Arc::new(Resilient::new(client, policy, cancel))
        }
    };
    Ok(provider)
}

fn build_embedder(
    config: &RagConfig,
    policy: RetryPolicy,
    cancel: CancellationToken,
) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedding = &config.embedding;
    let key = credential(&embedding.api_key_env)?;
    let provider: Arc<dyn EmbeddingProvider> = match embedding.provider {
        ProviderKind::Gemini => {
            let mut client = GeminiEmbedding::with_model(key, embedding.model.clone());
            if let Some(url) = &embedding.base_url {
                client = client.with_base_url(url);
            }
            Arc::new(Resilient::new(client, policy, cancel))
        }
        ProviderKind::OpenAi => {
            let mut client = OpenAiEmbedding::with_model(key, embedding.model.clone());
            if let Some(url) = &embedding.base_url {
                client = client.with_base_url(url);
            }
            Arc::new(Resilient::new(client, policy, cancel))
        }
    };
    Ok(provider)
}
