//! The [`LlmBackend`] seam, shared retry policy and a scripted mock.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{LlmError, Result};
use crate::types::{CompletionRequest, CompletionResponse, StopReason, Usage};

// ─────────────────────────────────────────────────────────────────────────────
// Shared Retry Logic
// ─────────────────────────────────────────────────────────────────────────────

/// Run `f` until it succeeds, fails permanently, or `max_retries` retries
/// are spent. The delay doubles each time unless a rate limit names its own.
pub async fn with_retry<F, Fut, T>(
    max_retries: u32,
    initial_backoff: Duration,
    backend_name: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut backoff = initial_backoff;
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() || attempt >= max_retries => return Err(e),
            Err(e) => {
                let wait = e.retry_after().unwrap_or(backoff);
                attempt += 1;
                tracing::warn!(
                    backend = backend_name,
                    attempt,
                    max_retries,
                    backoff_ms = wait.as_millis() as u64,
                    error = %e,
                    "Request failed, retrying"
                );
                tokio::time::sleep(wait).await;
                backoff *= 2;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM Backend Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A text completion service used as a reasoning engine.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Label for logs and capability descriptions.
    fn name(&self) -> &str;
}

pub type SharedBackend = Arc<dyn LlmBackend>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock Backend
// ─────────────────────────────────────────────────────────────────────────────

/// Scripted backend for tests: replies are popped in order and every request
/// is recorded. Running out of replies is a [`LlmError::Backend`].
#[derive(Debug)]
pub struct MockBackend {
    name: String,
    responses: Mutex<VecDeque<Result<CompletionResponse>>>,
    request_log: Mutex<Vec<CompletionRequest>>,
}

impl MockBackend {
    pub fn new(responses: Vec<CompletionResponse>) -> Self {
        Self {
            name: "mock".to_string(),
            responses: Mutex::new(responses.into_iter().map(Ok).collect()),
            request_log: Mutex::new(Vec::new()),
        }
    }

    pub fn with_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            texts
                .into_iter()
                .enumerate()
                .map(|(i, text)| {
                    CompletionResponse::new(
                        format!("mock_msg_{}", i + 1),
                        "mock-model",
                        text,
                        StopReason::EndTurn,
                        Usage::new(10, 20),
                    )
                })
                .collect(),
        )
    }

    pub fn with_text(text: impl Into<String>) -> Self {
        let text: String = text.into();
        Self::with_texts([text])
    }

    /// Queue an error after the already queued responses.
    pub fn then_error(self, error: LlmError) -> Self {
        self.responses.lock().push_back(Err(error));
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.request_log.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.request_log.lock().len()
    }
}

#[async_trait]
impl LlmBackend for MockBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.request_log.lock().push(request);

        self.responses.lock().pop_front().unwrap_or_else(|| {
            Err(LlmError::Backend(
                "MockBackend: no more responses available".to_string(),
            ))
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_mock_backend_single_response() {
        let backend = MockBackend::with_text("Hello!");

        let request = CompletionRequest::new("test-model", vec![Message::user("Hi")], 100);
        let response = backend.complete(request).await.unwrap();

        assert_eq!(response.text(), "Hello!");
        assert_eq!(backend.request_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_backend_exhausted() {
        let backend = MockBackend::with_texts(["one"]);
        let request = CompletionRequest::new("m", vec![Message::user("Hi")], 100);
        backend.complete(request.clone()).await.unwrap();
        let err = backend.complete(request).await.unwrap_err();
        assert!(err.to_string().contains("no more responses"));
        assert_eq!(backend.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_mock_backend_queued_error() {
        let backend = MockBackend::with_texts(Vec::<String>::new())
            .then_error(LlmError::Auth("bad key".to_string()));
        let request = CompletionRequest::new("m", vec![Message::user("Hi")], 100);
        let err = backend.complete(request).await.unwrap_err();
        assert!(matches!(err, LlmError::Auth(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_recovers_from_network_errors() {
        let attempts = AtomicU32::new(0);
        let result = with_retry(3, Duration::from_millis(100), "test", || async {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(LlmError::Network("reset".to_string()))
            } else {
                Ok("done")
            }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_gives_up() {
        let attempts = AtomicU32::new(0);
        let result: Result<()> = with_retry(2, Duration::from_millis(10), "test", || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(LlmError::rate_limit("busy"))
        })
        .await;
        assert!(matches!(result, Err(LlmError::RateLimit(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_skips_permanent_errors() {
        let attempts = AtomicU32::new(0);
        let result: Result<()> = with_retry(5, Duration::from_millis(10), "test", || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(LlmError::Auth("nope".to_string()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
