//! LLM backend abstraction for Quarry.
//!
//! Reasoning engines are text completion services. This crate provides the
//! [`LlmBackend`] trait, an OpenAI-compatible HTTP implementation that also
//! covers Groq and Ollama, and a [`MockBackend`] for tests.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  LlmBackend trait                       │
//! │  - complete() -> CompletionResponse     │
//! └─────────────────────────────────────────┘
//!                    │
//!     ┌──────────────┼──────────────┐
//!     ▼              ▼              ▼
//! ┌────────┐   ┌──────────┐   ┌────────┐
//! │ OpenAI │   │   Groq   │   │ Ollama │
//! └────────┘   └──────────┘   └────────┘
//! ```

pub mod backend;
pub mod error;
pub mod openai;
pub mod types;

pub use backend::{LlmBackend, MockBackend, SharedBackend, with_retry};
pub use error::{LlmError, RateLimitInfo, Result};
pub use openai::{OpenAiBackend, OpenAiConfig, create_shared_backend};
pub use types::{CompletionRequest, CompletionResponse, Message, Role, StopReason, Usage};
