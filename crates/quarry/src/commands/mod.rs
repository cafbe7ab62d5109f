//! CLI command handlers.

pub mod capabilities;
pub mod config;
pub mod run;
pub mod validate;

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context as _, Result};
use quarry_config::{Backend, LoadedConfig, QuarryConfig};
use quarry_llm::{OpenAiConfig, SharedBackend, create_shared_backend};
use quarry_pipeline::{CapabilityRegistry, FnCapability, InvocationPolicy, PipelineFile};
use quarry_tools::{HttpConfig, ReasonerConfig, SearchConfig, SearchProvider, ToolsConfig};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
    /// Merged configuration and where it came from.
    pub loaded: LoadedConfig,
}

impl Context {
    pub fn config(&self) -> &QuarryConfig {
        &self.loaded.config
    }
}

/// Load a definition file and check its structure.
pub fn load_definition(path: &Path) -> Result<PipelineFile> {
    let file = PipelineFile::from_path(path)
        .with_context(|| format!("Failed to load pipeline definition {}", path.display()))?;
    file.validate()
        .with_context(|| format!("Invalid pipeline definition {}", path.display()))?;
    Ok(file)
}

/// Every reasoner the definition's agents use.
pub fn reasoner_names(file: &PipelineFile) -> BTreeSet<String> {
    file.agents
        .iter()
        .map(|agent| agent.role.reasoner_name().to_string())
        .collect()
}

/// Runner limits from `[runner]`.
pub fn invocation_policy(config: &QuarryConfig) -> InvocationPolicy {
    let runner = config.runner();
    InvocationPolicy {
        invocation_timeout: Duration::from_secs(runner.effective_invocation_timeout_secs()),
        max_iterations: runner.effective_max_iterations(),
    }
}

/// Tool settings from `[tools]`.
///
/// With `offline`, a search provider whose key is missing falls back to
/// DuckDuckGo so definitions can be checked without credentials.
pub fn tools_config(config: &QuarryConfig, offline: bool) -> Result<ToolsConfig> {
    let tools = config.tools();

    let mut http = HttpConfig::default();
    if let Some(user_agent) = tools.user_agent {
        http.user_agent = user_agent;
    }
    if let Some(secs) = tools.fetch_timeout_secs {
        http.timeout = Duration::from_secs(secs);
    }

    let search = tools.search.unwrap_or_default();
    let api_key = search
        .api_key_env
        .as_deref()
        .and_then(|var| std::env::var(var).ok())
        .filter(|key| !key.is_empty());
    let provider = match SearchProvider::from_name(search.effective_provider(), api_key) {
        Ok(provider) => provider,
        Err(e) if offline => {
            tracing::debug!(error = %e, "Search provider unavailable offline, using DuckDuckGo");
            SearchProvider::DuckDuckGo
        }
        Err(e) => return Err(e).context("Invalid [tools.search] configuration"),
    };

    let mut search_config = SearchConfig {
        provider,
        ..Default::default()
    };
    if let Some(max) = search.max_results {
        search_config.max_results = max;
    }

    Ok(ToolsConfig {
        http,
        search: search_config,
        file_root: tools.file_root,
        max_output_bytes: tools.max_output_bytes,
    })
}

/// Build the LLM backend from `[llm]`.
pub fn llm_backend(config: &QuarryConfig) -> Result<SharedBackend> {
    let llm = config.llm();
    llm.validate()?;
    let api_key = llm.resolve_api_key()?;

    let backend = llm.effective_backend();
    let mut openai = match backend {
        Backend::Openai => OpenAiConfig::openai(api_key.clone().unwrap_or_default()),
        Backend::Groq => OpenAiConfig::groq(api_key.clone().unwrap_or_default()),
        Backend::Ollama => OpenAiConfig::ollama(),
        Backend::Custom => {
            OpenAiConfig::openai(api_key.clone().unwrap_or_default()).with_name("custom")
        }
    };
    if backend == Backend::Ollama
        && let Some(key) = api_key
    {
        openai = openai.with_api_key(key);
    }
    if let Some(url) = llm.base_url {
        openai = openai.with_base_url(url);
    }
    if let Some(model) = llm.model {
        openai = openai.with_model(model);
    }
    if let Some(secs) = llm.timeout_secs {
        openai = openai.with_timeout(Duration::from_secs(secs));
    }
    if let Some(retries) = llm.max_retries {
        openai = openai.with_max_retries(retries);
    }

    tracing::debug!(backend = %backend, "Creating LLM backend");
    Ok(create_shared_backend(openai)?)
}

fn reasoner_config(config: &QuarryConfig, name: &str) -> ReasonerConfig {
    let llm = config.llm();
    let defaults = ReasonerConfig::default();
    ReasonerConfig {
        name: name.to_string(),
        model: llm.model.unwrap_or_default(),
        max_tokens: llm.max_tokens.unwrap_or(defaults.max_tokens),
        temperature: llm.temperature,
    }
}

/// Registry with the default tools and an LLM reasoner under every name in
/// `reasoners`.
pub fn live_registry(
    config: &QuarryConfig,
    reasoners: &BTreeSet<String>,
) -> Result<CapabilityRegistry> {
    let backend = llm_backend(config)?;
    let mut registry = CapabilityRegistry::new();
    quarry_tools::register_defaults(&mut registry, &tools_config(config, false)?)?;
    for name in reasoners {
        quarry_tools::register_reasoner(
            &mut registry,
            backend.clone(),
            reasoner_config(config, name),
        );
    }
    Ok(registry)
}

/// Registry with the default tools and a canned reasoner under every name in
/// `reasoners`. The canned reasoner answers at once without calling anything.
pub fn offline_registry(
    config: &QuarryConfig,
    reasoners: &BTreeSet<String>,
) -> Result<CapabilityRegistry> {
    let mut registry = CapabilityRegistry::new();
    quarry_tools::register_defaults(&mut registry, &tools_config(config, true)?)?;
    for name in reasoners {
        registry.register(FnCapability::new(
            name.as_str(),
            "Dry-run reasoner that answers without calling a model",
            |transcript| Ok(format!("Final Answer: [dry run] {}", current_task(transcript))),
        ));
    }
    Ok(registry)
}

/// First line of the task section of a reasoning transcript.
fn current_task(transcript: &str) -> &str {
    transcript
        .split_once("# Current task\n")
        .and_then(|(_, rest)| rest.lines().map(str::trim).find(|l| !l.is_empty()))
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_task() {
        let transcript =
            "You are X.\n\n# Current task\n  Map the docs at https://a.dev\nMore detail\n";
        assert_eq!(current_task(transcript), "Map the docs at https://a.dev");
        assert_eq!(current_task("no task here"), "");
    }

    #[test]
    fn test_invocation_policy_from_config() {
        let config = QuarryConfig::from_toml("[runner]\ninvocation_timeout_secs = 5\n").unwrap();
        let policy = invocation_policy(&config);
        assert_eq!(policy.invocation_timeout, Duration::from_secs(5));
        assert_eq!(policy.max_iterations, 15);
    }

    #[test]
    fn test_offline_tools_fall_back_to_duckduckgo() {
        let config = QuarryConfig::from_toml("[tools.search]\nprovider = \"brave\"\n").unwrap();
        let tools = tools_config(&config, true).unwrap();
        assert_eq!(tools.search.provider, SearchProvider::DuckDuckGo);
        assert!(tools_config(&config, false).is_err());
    }

    #[test]
    fn test_custom_backend_requires_base_url() {
        let config =
            QuarryConfig::from_toml("[llm]\nbackend = \"custom\"\napi_key = \"k\"\n").unwrap();
        assert!(llm_backend(&config).is_err());
    }
}
