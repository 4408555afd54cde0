//! Chat completion providers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use ragbot_types::{ConversationTurn, Role};

use crate::embeddings::{GEMINI_BASE_URL, OPENAI_BASE_URL};
use crate::error::ProviderError;
use crate::http::send_json;

/// Per-call generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatOptions {
    /// Model identifier (e.g. "gemini-2.5-flash").
    pub model: String,
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl ChatOptions {
    pub fn new(model: impl Into<String>, temperature: f32) -> Self {
        Self {
            model: model.into(),
            temperature,
            system_prompt: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: Option<String>) -> Self {
        self.system_prompt = prompt;
        self
    }
}

/// Trait for generative chat models.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Provider identifier.
    fn id(&self) -> &str;
    /// Complete `prompt` as the next user message after `history`.
    async fn complete(
        &self,
        prompt: &str,
        history: &[ConversationTurn],
        options: &ChatOptions,
    ) -> Result<String, ProviderError>;
}

/// Google Gemini chat provider (`generateContent`).
pub struct GeminiChat {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiChat {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
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
impl ChatProvider for GeminiChat {
    fn id(&self) -> &str {
        "gemini"
    }

    async fn complete(
        &self,
        prompt: &str,
        history: &[ConversationTurn],
        options: &ChatOptions,
    ) -> Result<String, ProviderError> {
        let body = gemini_request(prompt, history, options);
        tracing::debug!(model = %options.model, turns = history.len(), "Gemini request");

        let request = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, options.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&body);
        let json = send_json("Gemini", request).await?;

        parse_gemini_text(&json)
    }
}

/// OpenAI-compatible chat provider (`chat/completions`).
pub struct OpenAiChat {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiChat {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
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
impl ChatProvider for OpenAiChat {
    fn id(&self) -> &str {
        "openai"
    }

    async fn complete(
        &self,
        prompt: &str,
        history: &[ConversationTurn],
        options: &ChatOptions,
    ) -> Result<String, ProviderError> {
        let body = openai_request(prompt, history, options);
        tracing::debug!(model = %options.model, turns = history.len(), "OpenAI request");

        let request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body);
        let json = send_json("OpenAI", request).await?;

        json.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| ProviderError::InvalidResponse("OpenAI reply has no content".into()))
    }
}

fn gemini_request(prompt: &str, history: &[ConversationTurn], options: &ChatOptions) -> Value {
    let mut contents: Vec<Value> = history
        .iter()
        .map(|turn| {
            let role = match turn.role {
                Role::User => "user",
                Role::Assistant => "model",
            };
            serde_json::json!({ "role": role, "parts": [{ "text": turn.content }] })
        })
        .collect();
    contents.push(serde_json::json!({ "role": "user", "parts": [{ "text": prompt }] }));

    let mut body = serde_json::json!({
        "contents": contents,
        "generationConfig": { "temperature": options.temperature },
    });
    if let Some(system) = &options.system_prompt {
        body["systemInstruction"] = serde_json::json!({ "parts": [{ "text": system }] });
    }
    body
}

fn openai_request(prompt: &str, history: &[ConversationTurn], options: &ChatOptions) -> Value {
    let mut messages = Vec::with_capacity(history.len() + 2);
    if let Some(system) = &options.system_prompt {
        messages.push(serde_json::json!({ "role": "system", "content": system }));
    }
    for turn in history {
        let role = match turn.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        messages.push(serde_json::json!({ "role": role, "content": turn.content }));
    }
    messages.push(serde_json::json!({ "role": "user", "content": prompt }));

    serde_json::json!({
        "model": options.model,
        "temperature": options.temperature,
        "messages": messages,
    })
}

/// Concatenate the text parts of the first candidate.
fn parse_gemini_text(json: &Value) -> Result<String, ProviderError> {
    let Some(parts) = json
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
    else {
        let reason = json
            .pointer("/promptFeedback/blockReason")
            .and_then(|r| r.as_str())
            .unwrap_or("no candidates");
        return Err(ProviderError::InvalidResponse(format!(
            "Gemini returned no answer: {reason}"
        )));
    };

    Ok(parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join(""))
}
