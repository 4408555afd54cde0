//! Deadlines, bounded retry and cooperative cancellation for remote calls.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use ragbot_config::NetworkConfig;
use ragbot_types::{ConversationTurn, WebSearchResult};

use crate::chat::{ChatOptions, ChatProvider};
use crate::embeddings::EmbeddingProvider;
use crate::error::ProviderError;
use crate::web_search::WebSearchProvider;

/// Per-call deadline and retry schedule.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Deadline for a single attempt.
    pub timeout: Duration,
    /// Attempts made after the first one fails.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each subsequent one.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &NetworkConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.backoff_ms),
        }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(1u32 << attempt.min(16))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&NetworkConfig::default())
    }
}

/// Run `call` under `policy`, retrying transient failures until the budget is spent.
///
/// Cancellation is checked while an attempt is in flight and while backing off.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    operation: &str,
    mut call: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0u32;
    loop {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            result = tokio::time::timeout(policy.timeout, call()) => match result {
                Ok(outcome) => outcome,
                Err(_) => Err(ProviderError::Timeout(policy.timeout)),
            },
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                let delay = policy.backoff_for(attempt);
                attempt += 1;
                tracing::debug!(operation, attempt, error = %e, ?delay, "Retrying remote call");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// Wraps a provider so every call goes through [`with_retry`].
pub struct Resilient<P> {
    inner: P,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl<P> Resilient<P> {
    pub fn new(inner: P, policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self {
            inner,
            policy,
            cancel,
        }
    }
}

#[async_trait]
impl<P: ChatProvider> ChatProvider for Resilient<P> {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn complete(
        &self,
        prompt: &str,
        history: &[ConversationTurn],
        options: &ChatOptions,
    ) -> Result<String, ProviderError> {
        let inner = &self.inner;
        with_retry(&self.policy, &self.cancel, "chat", move || {
            inner.complete(prompt, history, options)
        })
        .await
    }
}

#[async_trait]
impl<P: EmbeddingProvider> EmbeddingProvider for Resilient<P> {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let inner = &self.inner;
        with_retry(&self.policy, &self.cancel, "embed", move || {
            inner.embed_batch(texts)
        })
        .await
    }
}

#[async_trait]
impl<P: WebSearchProvider> WebSearchProvider for Resilient<P> {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<WebSearchResult>, ProviderError> {
        let inner = &self.inner;
        with_retry(&self.policy, &self.cancel, "web_search", move || {
            inner.search(query, max_results)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(200),
            max_retries,
            backoff: Duration::from_millis(1),
        }
    }

    fn unavailable() -> ProviderError {
        ProviderError::Api {
            provider: "test".into(),
            status: 503,
            message: "unavailable".into(),
        }
    }

    /// Chat provider failing with 503 a fixed number of times.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ChatProvider for Flaky {
        fn id(&self) -> &str {
            "flaky"
        }

        async fn complete(
            &self,
            prompt: &str,
            _history: &[ConversationTurn],
            _options: &ChatOptions,
        ) -> Result<String, ProviderError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(unavailable())
            } else {
                Ok(format!("echo: {prompt}"))
            }
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            timeout: Duration::from_secs(1),
            max_retries: 3,
            backoff: Duration::from_millis(100),
        };
        assert_eq!(policy.backoff_for(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let chat = Resilient::new(
            Flaky {
                failures: 2,
                calls: AtomicU32::new(0),
            },
            fast_policy(2),
            CancellationToken::new(),
        );
        let options = ChatOptions::new("m", 0.0);
        let reply = chat.complete("hi", &[], &options).await.unwrap();
        assert_eq!(reply, "echo: hi");
        assert_eq!(chat.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let chat = Resilient::new(
            Flaky {
                failures: 10,
                calls: AtomicU32::new(0),
            },
            fast_policy(1),
            CancellationToken::new(),
        );
        let options = ChatOptions::new("m", 0.0);
        let err = chat.complete("hi", &[], &options).await.unwrap_err();
        assert!(matches!(err, ProviderError::Api { status: 503, .. }));
        assert_eq!(chat.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_fast() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast_policy(5), &CancellationToken::new(), "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(ProviderError::Api {
                    provider: "test".into(),
                    status: 401,
                    message: "bad key".into(),
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout() {
        let policy = RetryPolicy {
            timeout: Duration::from_millis(20),
            max_retries: 0,
            backoff: Duration::from_millis(1),
        };
        let result: Result<(), _> = with_retry(&policy, &CancellationToken::new(), "slow", || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(ProviderError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<(), _> = with_retry(&fast_policy(3), &cancel, "op", || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(ProviderError::Cancelled)));
    }
}
