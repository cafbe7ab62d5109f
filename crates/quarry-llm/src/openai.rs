//! OpenAI-compatible API backend implementation.
//!
//! `OpenAiBackend` talks to OpenAI's chat completions endpoint or any
//! compatible service (Groq, Ollama, local servers).

use async_trait::async_trait;
use reqwest::{Client, Response, header};
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{LlmBackend, SharedBackend, with_retry};
use crate::error::{LlmError, RateLimitInfo, Result};
use crate::types::{CompletionRequest, CompletionResponse, Message, Role, StopReason, Usage};

const OPENAI_BASE: &str = "https://api.openai.com/v1";
const GROQ_BASE: &str = "https://api.groq.com/openai/v1";
const OLLAMA_BASE: &str = "http://localhost:11434/v1";

const HOSTED_TIMEOUT: Duration = Duration::from_secs(300);
const LOCAL_TIMEOUT: Duration = Duration::from_secs(600);

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Where and how to reach an OpenAI-compatible chat completions service.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Bearer token. Local services such as Ollama accept requests without one.
    pub api_key: Option<String>,

    /// Service root, without the `/chat/completions` suffix.
    pub base_url: String,

    /// Model used when a request leaves `model` empty.
    pub model: Option<String>,

    /// Per-request HTTP timeout.
    pub timeout: Duration,

    /// Retries after the first attempt for transient failures.
    pub max_retries: u32,

    /// First retry delay; doubles on every further attempt.
    pub retry_backoff: Duration,

    /// Label used in logs and error messages.
    pub name: String,
}

impl OpenAiConfig {
    fn preset(
        name: &str,
        base_url: &str,
        api_key: Option<String>,
        model: Option<&str>,
        timeout: Duration,
    ) -> Self {
        Self {
            api_key,
            base_url: base_url.to_string(),
            model: model.map(str::to_string),
            timeout,
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
            name: name.to_string(),
        }
    }

    /// OpenAI's hosted API.
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::preset(
            "openai",
            OPENAI_BASE,
            Some(api_key.into()),
            Some("gpt-4o-mini"),
            HOSTED_TIMEOUT,
        )
    }

    /// Groq's OpenAI-compatible endpoint.
    pub fn groq(api_key: impl Into<String>) -> Self {
        Self::preset(
            "groq",
            GROQ_BASE,
            Some(api_key.into()),
            Some("llama-3.1-70b-versatile"),
            HOSTED_TIMEOUT,
        )
    }

    /// A local Ollama server. No default model: Ollama serves whatever is pulled.
    pub fn ollama() -> Self {
        Self::preset("ollama", OLLAMA_BASE, None, None, LOCAL_TIMEOUT)
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAI Backend
// ─────────────────────────────────────────────────────────────────────────────

/// OpenAI-compatible API backend.
#[derive(Debug)]
pub struct OpenAiBackend {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiBackend {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Internal(format!("HTTP client for '{}': {}", config.name, e)))?;
        Ok(Self { client, config })
    }

    /// The backend's configuration.
    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    fn post_completions(&self) -> reqwest::RequestBuilder {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let builder = self.client.post(url);
        match &self.config.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Wire request for `request`. The system prompt becomes a leading
    /// `system` message.
    fn to_openai_request(&self, request: &CompletionRequest) -> Result<OpenAiChatRequest> {
        let model = if request.model.is_empty() {
            self.config.model.clone().ok_or_else(|| {
                LlmError::Config(format!("No model configured for backend '{}'", self.config.name))
            })?
        } else {
            request.model.clone()
        };

        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(ref system) = request.system {
            messages.push(OpenAiMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.extend(request.messages.iter().map(OpenAiMessage::from));

        Ok(OpenAiChatRequest {
            model,
            messages,
            max_tokens: Some(request.max_tokens),
            temperature: request.temperature,
            stream: false,
            stop: if request.stop_sequences.is_empty() {
                None
            } else {
                Some(request.stop_sequences.clone())
            },
        })
    }

    async fn handle_response(response: Response) -> Result<CompletionResponse> {
        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }
        let body = response.text().await?;
        serde_json::from_str::<OpenAiChatResponse>(&body)
            .map(CompletionResponse::from)
            .map_err(|e| LlmError::Serialization(format!("unexpected completion body: {}", e)))
    }

    /// Map a non-success status onto [`LlmError`]. 429 and 5xx stay retryable.
    async fn status_error(response: Response) -> LlmError {
        let status = response.status();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();

        let message = serde_json::from_str::<OpenAiErrorResponse>(&body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| format!("HTTP {}: {}", status, body));

        match status.as_u16() {
            401 | 403 => LlmError::Auth(format!("Authentication failed: {}", message)),
            429 => LlmError::RateLimit(RateLimitInfo::parse(&message, retry_after.as_deref())),
            500..=599 => LlmError::Network(format!("Server error: {}", message)),
            _ => LlmError::Backend(message),
        }
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let openai_request = self.to_openai_request(&request)?;

        tracing::debug!(
            backend = %self.config.name,
            model = %openai_request.model,
            messages = openai_request.messages.len(),
            stop = openai_request.stop.as_ref().map_or(0, Vec::len),
            "Requesting completion"
        );

        with_retry(
            self.config.max_retries,
            self.config.retry_backoff,
            &self.config.name,
            || async {
                let response = self.post_completions().json(&openai_request).send().await?;
                Self::handle_response(response).await
            },
        )
        .await
    }

    fn name(&self) -> &str {
        &self.config.name
    }
}

/// Build an [`OpenAiBackend`] behind a [`SharedBackend`].
pub fn create_shared_backend(config: OpenAiConfig) -> Result<SharedBackend> {
    Ok(Arc::new(OpenAiBackend::new(config)?))
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAI API Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, serde::Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

#[derive(Debug, serde::Serialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

impl From<&Message> for OpenAiMessage {
    fn from(m: &Message) -> Self {
        Self {
            role: match m.role {
                Role::User => "user".to_string(),
                Role::Assistant => "assistant".to_string(),
            },
            content: m.content.clone(),
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct OpenAiChatResponse {
    id: String,
    choices: Vec<OpenAiChoice>,
    model: String,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, serde::Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, serde::Deserialize)]
struct OpenAiErrorResponse {
    error: OpenAiErrorDetail,
}

#[derive(Debug, serde::Deserialize)]
struct OpenAiErrorDetail {
    message: String,
}

impl From<OpenAiChatResponse> for CompletionResponse {
    fn from(resp: OpenAiChatResponse) -> Self {
        let (content, stop_reason) = match resp.choices.into_iter().next() {
            Some(choice) => {
                let stop = match choice.finish_reason.as_deref() {
                    Some("length") => StopReason::MaxTokens,
                    _ => StopReason::EndTurn,
                };
                (choice.message.content.unwrap_or_default(), stop)
            }
            None => (String::new(), StopReason::EndTurn),
        };

        let usage = resp
            .usage
            .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        CompletionResponse::new(resp.id, resp.model, content, stop_reason, usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_presets() {
        let groq = OpenAiConfig::groq("key");
        assert_eq!(groq.name, "groq");
        assert!(groq.base_url.contains("groq.com"));

        let ollama = OpenAiConfig::ollama();
        assert!(ollama.api_key.is_none());
        assert_eq!(ollama.timeout, Duration::from_secs(600));
    }

    #[test]
    fn test_request_conversion() {
        let backend = OpenAiBackend::new(OpenAiConfig::groq("key")).unwrap();
        let request = CompletionRequest::new("", vec![Message::user("Map the docs")], 512)
            .with_system("You are a navigator.")
            .with_stop_sequences(["\nObservation:"]);

        let converted = backend.to_openai_request(&request).unwrap();
        assert_eq!(converted.model, "llama-3.1-70b-versatile");
        assert_eq!(converted.messages.len(), 2);
        assert_eq!(converted.messages[0].role, "system");
        assert_eq!(converted.messages[1].content, "Map the docs");
        assert_eq!(converted.stop, Some(vec!["\nObservation:".to_string()]));
    }

    #[test]
    fn test_request_without_any_model() {
        let backend = OpenAiBackend::new(OpenAiConfig::ollama()).unwrap();
        let request = CompletionRequest::new("", vec![Message::user("hi")], 8);
        assert!(matches!(
            backend.to_openai_request(&request),
            Err(LlmError::Config(_))
        ));
    }

    #[test]
    fn test_response_conversion() {
        let resp: OpenAiChatResponse = serde_json::from_str(
            r#"{
                "id": "chatcmpl-1",
                "model": "gpt-4o-mini",
                "choices": [{"message": {"content": "Final Answer: 42"}, "finish_reason": "length"}],
                "usage": {"prompt_tokens": 12, "completion_tokens": 3}
            }"#,
        )
        .unwrap();
        let converted: CompletionResponse = resp.into();
        assert_eq!(converted.text(), "Final Answer: 42");
        assert!(converted.truncated());
        assert_eq!(converted.usage.total(), 15);
    }
}
