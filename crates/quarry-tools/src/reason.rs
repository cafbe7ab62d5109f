//! The LLM reasoning engine as a capability.
//!
//! Actors drive their reasoning loop through an ordinary capability; this one
//! forwards the transcript to an [`LlmBackend`](quarry_llm::LlmBackend) and
//! returns the model's next reply. Generation stops before the model can
//! invent its own `Observation:` line.

use async_trait::async_trait;
use quarry_llm::{CompletionRequest, Message, SharedBackend};
use quarry_pipeline::{Capability, DEFAULT_REASONER, InvocationFailure};
use tracing::{debug, warn};

/// Stop sequence that ends a reply at the point an observation would begin.
pub const OBSERVATION_STOP: &str = "\nObservation:";

const SYSTEM_PROMPT: &str = "You are a member of a research crew. Work one step at a time. \
To use a capability, reply with an `Action:` line and an `Action Input:` line, then stop and \
wait for the observation. When you are done, reply with `Final Answer:` followed by the \
complete answer.";

/// Settings for an [`LlmReasoner`].
#[derive(Debug, Clone)]
pub struct ReasonerConfig {
    /// Capability name actors reference.
    pub name: String,
    /// Model to request; empty means the backend's default.
    pub model: String,
    /// Maximum tokens per reply.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: Option<f32>,
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_REASONER.to_string(),
            model: String::new(),
            max_tokens: 4096,
            temperature: None,
        }
    }
}

/// Reasoning engine backed by an LLM.
pub struct LlmReasoner {
    backend: SharedBackend,
    config: ReasonerConfig,
    description: String,
}

impl LlmReasoner {
    /// Create a reasoner over `backend`.
    pub fn new(backend: SharedBackend, config: ReasonerConfig) -> Self {
        let description = format!("Reasoning engine backed by the '{}' backend", backend.name());
        Self {
            backend,
            config,
            description,
        }
    }

    fn request(&self, transcript: &str) -> CompletionRequest {
        let mut request = CompletionRequest::new(
            self.config.model.clone(),
            vec![Message::user(transcript)],
            self.config.max_tokens,
        )
        .with_system(SYSTEM_PROMPT)
        .with_stop_sequences([OBSERVATION_STOP]);
        if let Some(temperature) = self.config.temperature {
            request = request.with_temperature(temperature);
        }
        request
    }
}

impl std::fmt::Debug for LlmReasoner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmReasoner")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .finish()
    }
}

#[async_trait]
impl Capability for LlmReasoner {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn invoke(&self, input: &str) -> Result<String, InvocationFailure> {
        let response = self
            .backend
            .complete(self.request(input))
            .await
            .map_err(|e| InvocationFailure::new(self.name(), e.to_string()))?;

        debug!(
            reasoner = %self.config.name,
            model = %response.model,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "Reasoner replied"
        );
        if response.truncated() {
            warn!(reasoner = %self.config.name, "Reasoner reply hit the token limit");
        }

        let text = response.text().trim();
        if text.is_empty() {
            return Err(InvocationFailure::new(self.name(), "reasoner returned an empty reply"));
        }
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_llm::{LlmError, MockBackend};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_forwards_transcript_with_stop() {
        let backend = Arc::new(MockBackend::with_text("Final Answer: done"));
        let reasoner = LlmReasoner::new(
            backend.clone(),
            ReasonerConfig {
                temperature: Some(0.1),
                ..Default::default()
            },
        );

        let reply = reasoner.invoke("You are a reviewer.\n# Current task\nReview").await.unwrap();
        assert_eq!(reply, "Final Answer: done");

        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages[0].content, "You are a reviewer.\n# Current task\nReview");
        assert_eq!(requests[0].stop_sequences, vec![OBSERVATION_STOP]);
        assert_eq!(requests[0].temperature, Some(0.1));
        assert!(requests[0].system.is_some());
    }

    #[tokio::test]
    async fn test_backend_error_becomes_failure() {
        let backend = Arc::new(
            MockBackend::with_texts(Vec::<String>::new())
                .then_error(LlmError::Auth("bad key".into())),
        );
        let reasoner = LlmReasoner::new(backend, ReasonerConfig::default());

        let failure = reasoner.invoke("prompt").await.unwrap_err();
        assert_eq!(failure.capability, "reason");
        assert_eq!(failure.message, "Authentication error: bad key");
    }

    #[tokio::test]
    async fn test_empty_reply_is_failure() {
        let reasoner = LlmReasoner::new(
            Arc::new(MockBackend::with_text("   ")),
            ReasonerConfig::default(),
        );
        let failure = reasoner.invoke("prompt").await.unwrap_err();
        assert!(failure.message.contains("empty reply"));
    }

    #[test]
    fn test_custom_name() {
        let reasoner = LlmReasoner::new(
            Arc::new(MockBackend::with_text("x")),
            ReasonerConfig {
                name: "fast_llm".into(),
                ..Default::default()
            },
        );
        assert_eq!(reasoner.name(), "fast_llm");
        assert!(reasoner.description().contains("mock"));
    }
}
