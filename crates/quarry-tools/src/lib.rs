//! Concrete capabilities for Quarry pipelines.
//!
//! The pipeline core treats every capability as an opaque text operation.
//! This crate supplies the ones the documentation crew needs:
//!
//! | Name             | Input                     | Output                         |
//! |------------------|---------------------------|--------------------------------|
//! | `web_search`     | query                     | numbered titles, URLs, snippets|
//! | `scrape_website` | URL                       | readable page text             |
//! | `scrape_element` | `<url> <css selector>`    | text of matched elements       |
//! | `file_read`      | path                      | file contents                  |
//! | `reason`         | reasoning transcript      | next reasoning reply           |
//!
//! Inputs may also be a JSON object (`{"url": ...}`). All outputs are
//! size-bounded by [`sanitize_output`].

pub mod error;
pub mod file;
pub mod input;
pub mod reason;
pub mod sanitize;
pub mod web;

use std::path::PathBuf;

use quarry_llm::SharedBackend;
use quarry_pipeline::CapabilityRegistry;

pub use error::{Result, ToolError};
pub use file::FileRead;
pub use reason::{LlmReasoner, OBSERVATION_STOP, ReasonerConfig};
pub use sanitize::{OutputConfig, sanitize_output};
pub use web::{
    HttpConfig, ScrapeElement, ScrapeWebsite, SearchConfig, SearchProvider, SearchResult,
    WebSearch, extract_readable_text, extract_title, select_text,
};

/// Settings for the default tool set.
#[derive(Debug, Clone, Default)]
pub struct ToolsConfig {
    /// HTTP settings shared by the web capabilities.
    pub http: HttpConfig,
    /// Search provider settings.
    pub search: SearchConfig,
    /// Confine `file_read` to this directory.
    pub file_root: Option<PathBuf>,
    /// Cap every tool's output at this many bytes.
    pub max_output_bytes: Option<usize>,
}

/// Register `web_search`, `scrape_website`, `scrape_element` and `file_read`.
pub fn register_defaults(registry: &mut CapabilityRegistry, config: &ToolsConfig) -> Result<()> {
    let bounded = |default: OutputConfig| match config.max_output_bytes {
        Some(max) => OutputConfig::with_max_size(max),
        None => default,
    };

    registry.register(
        WebSearch::new(&config.http, config.search.clone())?
            .with_output(bounded(OutputConfig::for_search())),
    );
    registry.register(
        ScrapeWebsite::new(&config.http)?.with_output(bounded(OutputConfig::for_scrape())),
    );
    registry.register(
        ScrapeElement::new(&config.http)?.with_output(bounded(OutputConfig::for_scrape())),
    );

    let mut file_read = FileRead::new().with_output(bounded(OutputConfig::for_file_read()));
    if let Some(root) = &config.file_root {
        file_read = file_read.with_root(root);
    }
    registry.register(file_read);

    tracing::debug!(
        search = config.search.provider.name(),
        file_root = ?config.file_root,
        "Registered default capabilities"
    );
    Ok(())
}

/// Register an LLM reasoner.
pub fn register_reasoner(
    registry: &mut CapabilityRegistry,
    backend: SharedBackend,
    config: ReasonerConfig,
) {
    registry.register(LlmReasoner::new(backend, config));
}

/// Build a registry with the default tools and one reasoner.
pub fn build_registry(
    config: &ToolsConfig,
    backend: SharedBackend,
    reasoner: ReasonerConfig,
) -> Result<CapabilityRegistry> {
    let mut registry = CapabilityRegistry::new();
    register_defaults(&mut registry, config)?;
    register_reasoner(&mut registry, backend, reasoner);
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_llm::MockBackend;
    use std::sync::Arc;

    #[test]
    fn test_build_registry_names() {
        let registry = build_registry(
            &ToolsConfig::default(),
            Arc::new(MockBackend::with_text("Final Answer: ok")),
            ReasonerConfig::default(),
        )
        .unwrap();
        assert_eq!(
            registry.names(),
            vec!["file_read", "reason", "scrape_element", "scrape_website", "web_search"]
        );
    }
}
