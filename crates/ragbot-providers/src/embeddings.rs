//! Embedding providers for vector storage.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ProviderError;
use crate::http::send_json;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Trait for embedding text into vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider identifier.
    fn id(&self) -> &str;
    /// Model name.
    fn model(&self) -> &str;
    /// Embed a batch of texts; the output has one vector per input, in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;
    /// Embed a single query.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let batch = self.embed_batch(&[text.to_string()]).await?;
        batch
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("Empty embedding result".into()))
    }
}

/// OpenAI embedding provider.
pub struct OpenAiEmbedding {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiEmbedding {
    pub fn new(api_key: String) -> Self {
        Self::with_model(api_key, "text-embedding-3-small".to_string())
    }

    pub fn with_model(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            base_url: OPENAI_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
    fn id(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let request = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body);
        let json = send_json("OpenAI", request).await?;

        parse_openai_embeddings(&json, texts.len())
    }
}

/// Gemini embedding provider (`batchEmbedContents`).
pub struct GeminiEmbedding {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiEmbedding {
    pub fn new(api_key: String) -> Self {
        Self::with_model(api_key, "text-embedding-004".to_string())
    }

    pub fn with_model(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            base_url: GEMINI_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    fn id(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model_ref = format!("models/{}", self.model);
        let requests: Vec<Value> = texts
            .iter()
            .map(|text| {
                serde_json::json!({
                    "model": model_ref,
                    "content": { "parts": [{ "text": text }] },
                })
            })
            .collect();

        let request = self
            .client
            .post(format!(
                "{}/models/{}:batchEmbedContents",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&serde_json::json!({ "requests": requests }));
        let json = send_json("Gemini", request).await?;

        parse_gemini_embeddings(&json, texts.len())
    }
}

fn parse_vector(values: &Value) -> Result<Vec<f32>, ProviderError> {
    let array = values
        .as_array()
        .ok_or_else(|| ProviderError::InvalidResponse("Missing embedding array".into()))?;
    Ok(array
        .iter()
        .filter_map(|v| v.as_f64().map(|f| f as f32))
        .collect())
}

/// Decode `{"data": [{"index": n, "embedding": [...]}, ...]}`, ordered by `index`.
fn parse_openai_embeddings(json: &Value, expected: usize) -> Result<Vec<Vec<f32>>, ProviderError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| ProviderError::InvalidResponse("Invalid embedding response format".into()))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let embedding = parse_vector(item.get("embedding").unwrap_or(&Value::Null))?;
        indexed.push((index, embedding));
    }
    indexed.sort_by_key(|(index, _)| *index);

    check_count(indexed.into_iter().map(|(_, e)| e).collect(), expected)
}

/// Decode `{"embeddings": [{"values": [...]}, ...]}`.
fn parse_gemini_embeddings(json: &Value, expected: usize) -> Result<Vec<Vec<f32>>, ProviderError> {
    let items = json
        .get("embeddings")
        .and_then(|d| d.as_array())
        .ok_or_else(|| ProviderError::InvalidResponse("Invalid embedding response format".into()))?;

    let embeddings = items
        .iter()
        .map(|item| parse_vector(item.get("values").unwrap_or(&Value::Null)))
        .collect::<Result<Vec<_>, _>>()?;

    check_count(embeddings, expected)
}

fn check_count(embeddings: Vec<Vec<f32>>, expected: usize) -> Result<Vec<Vec<f32>>, ProviderError> {
    if embeddings.len() != expected {
        return Err(ProviderError::InvalidResponse(format!(
            "Expected {expected} embeddings, got {}",
            embeddings.len()
        )));
    }
    Ok(embeddings)
}
