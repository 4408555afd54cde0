//! Shared JSON-over-HTTP plumbing for the vendor clients.

use serde_json::Value;

use crate::error::ProviderError;

/// Send a request and decode its JSON body, turning non-2xx replies into `Api` errors.
pub(crate) async fn send_json(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> Result<Value, ProviderError> {
    let resp = request.send().await?;
    let status = resp.status();
    let body = resp.text().await?;

    if !status.is_success() {
        let json: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
        let message = error_message(&json).unwrap_or_else(|| truncate(&body, 200));
        return Err(ProviderError::Api {
            provider: provider.to_string(),
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_str(&body)
        .map_err(|e| ProviderError::InvalidResponse(format!("{provider}: {e}")))
}

/// Extract the vendor error message (OpenAI/Gemini `error.message`, Tavily `detail.error`).
fn error_message(json: &Value) -> Option<String> {
    json.pointer("/error/message")
        .or_else(|| json.pointer("/detail/error"))
        .or_else(|| json.get("error"))
        .or_else(|| json.get("detail"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
}

fn truncate(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return "Unknown error".to_string();
    }
    trimmed.chars().take(max_chars).collect()
}
