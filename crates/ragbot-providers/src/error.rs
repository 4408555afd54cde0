use std::time::Duration;

use thiserror::Error;

/// Failure of an external collaborator call.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),
    #[error("Failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{provider} API error ({status}): {message}")]
    Api {
        provider: String,
        status: u16,
        message: String,
    },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Call timed out after {0:?}")]
    Timeout(Duration),
    #[error("Call cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Whether another attempt may succeed (transient transport or server failures).
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ProviderError::Api { status, .. } => *status == 429 || *status >= 500,
            ProviderError::Timeout(_) => true,
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProviderError::Cancelled)
    }
}
