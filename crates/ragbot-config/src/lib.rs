use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON5 parse error: {0}")]
    Json5(#[from] json5::Error),
    #[error("Config directory not found")]
    NoDirFound,
    #[error("Missing credential: environment variable {0} is not set")]
    MissingCredential(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("No document sources configured")]
    NoSources,
}

/// Remote model vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gemini,
    OpenAi,
}

/// Generative chat model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub provider: ProviderKind,
    /// Model identifier (e.g. "gemini-2.5-flash").
    pub model: String,
    pub temperature: f32,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Optional instruction sent ahead of the conversation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Override of the vendor endpoint (proxies, tests).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Gemini,
            model: "gemini-2.5-flash".to_string(),
            temperature: 0.3,
            api_key_env: "GEMINI_API_KEY".to_string(),
            system_prompt: None,
            base_url: None,
        }
    }
}

/// Embedding model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: ProviderKind,
    pub model: String,
    pub api_key_env: String,
    /// Texts sent per embedding request during ingestion.
    pub batch_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Gemini,
            model: "text-embedding-004".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            batch_size: 32,
            base_url: None,
        }
    }
}

/// Web search settings (hybrid mode only).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSearchConfig {
    pub api_key_env: String,
    pub max_results: usize,
    pub min_score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            api_key_env: "TAVILY_API_KEY".to_string(),
            max_results: 3,
            min_score: 0.0,
            base_url: None,
        }
    }
}

/// Document splitting settings, in characters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap: usize,
    /// Segments shorter than this (after trimming) are dropped.
    pub min_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: 300,
            overlap: 30,
            min_chars: 10,
        }
    }
}

/// Rewriting applied to each question before retrieval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryTransform {
    /// Use the question as typed.
    #[default]
    Identity,
    /// Rewrite follow-ups into standalone questions using the conversation.
    Compress,
    /// Add model-generated rephrasings of the question.
    Expand,
    /// Compress, then expand the compressed question.
    Chain,
}

/// Default retrieval limits for local document retrievers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub max_results: usize,
    pub min_score: f32,
    /// Maximum number of merged segments placed in the prompt.
    pub merge_ceiling: usize,
    pub transformer: QueryTransform,
    /// Rephrasings requested by the `expand` and `chain` transformers.
    pub expansions: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_results: 3,
            min_score: 0.5,
            merge_ceiling: 6,
            transformer: QueryTransform::Identity,
            expansions: 3,
        }
    }
}

/// Conversation memory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Number of turns kept (user and assistant turns both count).
    pub capacity: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { capacity: 10 }
    }
}

/// Deadline and retry policy for every remote call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Initial backoff, doubled after every failed attempt.
    pub backoff_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 2,
            backoff_ms: 500,
        }
    }
}

/// A named document corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Label used by the router (e.g. "recipes").
    pub name: String,
    /// File or directory to ingest.
    pub path: PathBuf,
    /// Human-readable description of the knowledge domain.
    #[serde(default)]
    pub description: String,
}

/// Top-level ragbot configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RagConfig {
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub web_search: WebSearchConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl RagConfig {
    /// Reject settings that would make the pipeline misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory.capacity == 0 {
            return Err(ConfigError::Invalid("memory.capacity must be at least 1".into()));
        }
        if self.chunking.max_chars == 0 {
            return Err(ConfigError::Invalid("chunking.max_chars must be at least 1".into()));
        }
        if self.chunking.overlap >= self.chunking.max_chars {
            return Err(ConfigError::Invalid(
                "chunking.overlap must be smaller than chunking.max_chars".into(),
            ));
        }
        if self.retrieval.expansions == 0 {
            return Err(ConfigError::Invalid("retrieval.expansions must be at least 1".into()));
        }
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::Invalid("embedding.batch_size must be at least 1".into()));
        }
        for (name, score) in [
            ("retrieval.min_score", self.retrieval.min_score),
            ("web_search.min_score", self.web_search.min_score),
        ] {
            if !(-1.0..=1.0).contains(&score) {
                return Err(ConfigError::Invalid(format!("{name} must be within [-1, 1]")));
            }
        }
        if !(0.0..=2.0).contains(&self.chat.temperature) {
            return Err(ConfigError::Invalid("chat.temperature must be within [0, 2]".into()));
        }
        Ok(())
    }

    /// Look up a configured source by name.
    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.name == name)
    }
}

/// Read a required credential from the environment.
pub fn credential(var: &str) -> Result<String, ConfigError> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingCredential(var.to_string())),
    }
}

/// Resolve the ragbot config directory (~/.ragbot/).
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|h| h.join(".ragbot"))
        .ok_or(ConfigError::NoDirFound)
}

/// Resolve the config file path (~/.ragbot/config.json5).
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.json5"))
}

/// Load a `.env` file from the working directory, if present.
///
/// Variables already set in the environment win over the file.
pub fn load_env() {
    let _ = dotenvy::dotenv();
}

/// Load configuration from the default path, falling back to defaults.
pub fn load_config() -> Result<RagConfig, ConfigError> {
    load_env();

    let path = config_file_path()?;
    load_config_from(&path)
}

/// Load configuration from a specific path, falling back to defaults if not found.
pub fn load_config_from(path: &Path) -> Result<RagConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!("Config file not found at {}, using defaults", path.display());
        return Ok(RagConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: RagConfig = json5::from_str(&content)?;
    config.validate()?;
    Ok(config)
}
