//! Web search providers.

use async_trait::async_trait;
use serde_json::Value;

use ragbot_types::WebSearchResult;

use crate::error::ProviderError;
use crate::http::send_json;

pub const TAVILY_BASE_URL: &str = "https://api.tavily.com";

/// Trait for live web search services.
#[async_trait]
pub trait WebSearchProvider: Send + Sync {
    /// Provider identifier.
    fn id(&self) -> &str;
    /// Return at most `max_results` hits, best first.
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<WebSearchResult>, ProviderError>;
}

/// Tavily search API client.
pub struct TavilySearch {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl TavilySearch {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: TAVILY_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl WebSearchProvider for TavilySearch {
    fn id(&self) -> &str {
        "tavily"
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<WebSearchResult>, ProviderError> {
        let body = serde_json::json!({
            "query": query,
            "max_results": max_results,
            "search_depth": "basic",
        });

        let request = self
            .client
            .post(format!("{}/search", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body);
        let json = send_json("Tavily", request).await?;

        let mut results = parse_tavily_results(&json)?;
        results.truncate(max_results);
        Ok(results)
    }
}

fn parse_tavily_results(json: &Value) -> Result<Vec<WebSearchResult>, ProviderError> {
    let items = json
        .get("results")
        .and_then(|r| r.as_array())
        .ok_or_else(|| ProviderError::InvalidResponse("Tavily reply has no results".into()))?;

    Ok(items
        .iter()
        .filter_map(|item| {
            let url = item.get("url")?.as_str()?.to_string();
            let text = |key: &str| {
                item.get(key)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .trim()
                    .to_string()
            };
            Some(WebSearchResult {
                title: text("title"),
                url,
                snippet: text("content"),
                score: item.get("score").and_then(|s| s.as_f64()).map(|s| s as f32),
            })
        })
        .collect())
}
