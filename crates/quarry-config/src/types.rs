//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [llm]
//! backend = "groq"
//! model = "llama-3.1-70b-versatile"
//! api_key_env = "GROQ_API_KEY"
//!
//! [runner]
//! invocation_timeout_secs = 120
//! max_iterations = 15
//!
//! [tools]
//! user_agent = "Quarry"
//! file_root = "./output"
//!
//! [tools.search]
//! provider = "serper"
//! api_key_env = "SERPER_API_KEY"
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Replace `base` with `other` when `other` is set.
fn overlay<T>(base: &mut Option<T>, other: Option<T>) {
    if other.is_some() {
        *base = other;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// Every section and field is optional so partial layers can be merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuarryConfig {
    /// Reasoning backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm: Option<LlmConfig>,

    /// Pipeline runner settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runner: Option<RunnerConfig>,

    /// Capability settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsConfig>,
}

impl QuarryConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one; fields set in `other` win.
    pub fn merge(&mut self, other: QuarryConfig) {
        if let Some(llm) = other.llm {
            self.llm.get_or_insert_with(LlmConfig::default).merge(llm);
        }
        if let Some(runner) = other.runner {
            self.runner.get_or_insert_with(RunnerConfig::default).merge(runner);
        }
        if let Some(tools) = other.tools {
            self.tools.get_or_insert_with(ToolsConfig::default).merge(tools);
        }
    }

    /// The `[llm]` section, or defaults.
    pub fn llm(&self) -> LlmConfig {
        self.llm.clone().unwrap_or_default()
    }

    /// The `[runner]` section, or defaults.
    pub fn runner(&self) -> RunnerConfig {
        self.runner.clone().unwrap_or_default()
    }

    /// The `[tools]` section, or defaults.
    pub fn tools(&self) -> ToolsConfig {
        self.tools.clone().unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Supported reasoning backends. All speak the OpenAI chat completions API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Openai,
    Groq,
    Ollama,
    /// Any OpenAI-compatible endpoint; requires `base_url`.
    Custom,
}

impl Backend {
    /// Environment variable conventionally holding this backend's API key.
    pub fn env_var(&self) -> &'static str {
        match self {
            Backend::Openai => "OPENAI_API_KEY",
            Backend::Groq => "GROQ_API_KEY",
            Backend::Ollama => "OLLAMA_API_KEY",
            Backend::Custom => "LLM_API_KEY",
        }
    }

    /// Whether requests need an API key.
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Backend::Ollama)
    }

    /// Human-readable name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Backend::Openai => "OpenAI",
            Backend::Groq => "Groq",
            Backend::Ollama => "Ollama",
            Backend::Custom => "Custom",
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Configuration for the reasoning backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Backend provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<Backend>,
    /// Model identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Custom API base URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// API key in plain text (warns when loaded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Environment variable holding the API key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Maximum tokens per reasoning reply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// HTTP timeout for a completion request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Retries on transient errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

impl LlmConfig {
    /// Merge another config on top of this one.
    pub fn merge(&mut self, other: LlmConfig) {
        overlay(&mut self.backend, other.backend);
        overlay(&mut self.model, other.model);
        overlay(&mut self.base_url, other.base_url);
        overlay(&mut self.api_key, other.api_key);
        overlay(&mut self.api_key_env, other.api_key_env);
        overlay(&mut self.max_tokens, other.max_tokens);
        overlay(&mut self.temperature, other.temperature);
        overlay(&mut self.timeout_secs, other.timeout_secs);
        overlay(&mut self.max_retries, other.max_retries);
    }

    /// Returns true if an API key is stored directly in the config file.
    pub fn has_plaintext_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// The backend in effect.
    pub fn effective_backend(&self) -> Backend {
        self.backend.unwrap_or_default()
    }

    /// The environment variable consulted for the API key.
    pub fn api_key_env_var(&self) -> &str {
        self.api_key_env
            .as_deref()
            .unwrap_or_else(|| self.effective_backend().env_var())
    }

    /// Resolve the API key: config file first, then the environment.
    ///
    /// Returns `Ok(None)` for backends that work without a key.
    pub fn resolve_api_key(&self) -> Result<Option<String>> {
        self.resolve_api_key_with(|name| std::env::var(name).ok())
    }

    /// [`resolve_api_key`](Self::resolve_api_key) with an injectable lookup.
    pub fn resolve_api_key_with<F>(&self, lookup: F) -> Result<Option<String>>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.is_empty()) {
            return Ok(Some(key.clone()));
        }
        let env_var = self.api_key_env_var();
        if let Some(key) = lookup(env_var).filter(|k| !k.is_empty()) {
            return Ok(Some(key));
        }

        let backend = self.effective_backend();
        if backend.requires_api_key() {
            Err(ConfigError::ApiKeyNotFound {
                backend: backend.to_string(),
                env_var: env_var.to_string(),
            })
        } else {
            Ok(None)
        }
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.effective_backend() == Backend::Custom && self.base_url.is_none() {
            return Err(ConfigError::InvalidValue {
                field: "llm.base_url".to_string(),
                reason: "required when backend = \"custom\"".to_string(),
            });
        }
        if let Some(t) = self.temperature
            && !(0.0..=2.0).contains(&t)
        {
            return Err(ConfigError::InvalidValue {
                field: "llm.temperature".to_string(),
                reason: format!("{} is outside 0.0..=2.0", t),
            });
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Runner Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default per-invocation timeout.
pub const DEFAULT_INVOCATION_TIMEOUT_SECS: u64 = 120;

/// Default bound on reasoning rounds per step.
pub const DEFAULT_MAX_ITERATIONS: u32 = 15;

/// Pipeline runner settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Timeout applied to every capability invocation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invocation_timeout_secs: Option<u64>,
    /// Maximum reasoning rounds per step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
}

impl RunnerConfig {
    /// Merge another config on top of this one.
    pub fn merge(&mut self, other: RunnerConfig) {
        overlay(&mut self.invocation_timeout_secs, other.invocation_timeout_secs);
        overlay(&mut self.max_iterations, other.max_iterations);
    }

    pub fn effective_invocation_timeout_secs(&self) -> u64 {
        self.invocation_timeout_secs
            .unwrap_or(DEFAULT_INVOCATION_TIMEOUT_SECS)
    }

    pub fn effective_max_iterations(&self) -> u32 {
        self.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tools Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Capability settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// User agent for web requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Timeout for page fetches and search requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_timeout_secs: Option<u64>,
    /// Cap on every capability's output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_bytes: Option<usize>,
    /// Confine `file_read` to this directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_root: Option<PathBuf>,
    /// Web search provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<SearchConfig>,
}

impl ToolsConfig {
    /// Merge another config on top of this one.
    pub fn merge(&mut self, other: ToolsConfig) {
        overlay(&mut self.user_agent, other.user_agent);
        overlay(&mut self.fetch_timeout_secs, other.fetch_timeout_secs);
        overlay(&mut self.max_output_bytes, other.max_output_bytes);
        overlay(&mut self.file_root, other.file_root);
        if let Some(search) = other.search {
            self.search.get_or_insert_with(SearchConfig::default).merge(search);
        }
    }
}

/// The `[tools.search]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// `duckduckgo` (default), `brave`, `serper` or `tavily`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Environment variable holding the provider's API key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Maximum results per query.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,
}

impl SearchConfig {
    /// Merge another config on top of this one.
    pub fn merge(&mut self, other: SearchConfig) {
        overlay(&mut self.provider, other.provider);
        overlay(&mut self.api_key_env, other.api_key_env);
        overlay(&mut self.max_results, other.max_results);
    }

    /// The provider name in effect.
    pub fn effective_provider(&self) -> &str {
        self.provider.as_deref().unwrap_or("duckduckgo")
    }
}
