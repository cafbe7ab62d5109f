//! Declarative pipeline definitions.
//!
//! Pipelines can be described in TOML (or YAML) and loaded at runtime:
//!
//! ```toml
//! [pipeline]
//! name = "langgraph_docs"
//! description = "Scrape and review the LangGraph documentation"
//!
//! [pipeline.inputs]
//! url = "https://langchain-ai.github.io/langgraph/"
//!
//! [[agents]]
//! id = "doc_navigator"
//! role = "Documentation Navigator"
//! goal = "Map the documentation structure"
//! capabilities = ["web_search", "scrape_website"]
//!
//! [[steps]]
//! id = "map_documentation_structure"
//! agent = "doc_navigator"
//! description = "Map the documentation at {{input.url}}"
//! expected_output = "A structured list of documentation pages"
//! capabilities = ["scrape_website"]
//! ```

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::capability::CapabilityRegistry;
use crate::error::{PipelineError, Result};
use crate::pipeline::{ActorSpec, Discipline, Pipeline, PipelineBuilder, StepSpec};

/// Top-level definition file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineFile {
    /// Pipeline metadata.
    pub pipeline: PipelineMeta,

    /// Actor definitions.
    #[serde(default, alias = "actors")]
    pub agents: Vec<ActorSpec>,

    /// Steps in execution order.
    #[serde(default, alias = "tasks")]
    pub steps: Vec<StepSpec>,
}

/// The `[pipeline]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineMeta {
    /// Unique pipeline name.
    pub name: String,

    /// Human-readable description.
    #[serde(default)]
    pub description: String,

    /// Execution discipline.
    #[serde(default)]
    pub discipline: Discipline,

    /// Default run inputs, overridable at kickoff.
    #[serde(default)]
    pub inputs: HashMap<String, String>,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

impl PipelineFile {
    /// Parse a definition from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| PipelineError::InvalidDefinition(format!("TOML parse error: {}", e)))
    }

    /// Parse a definition from a YAML string.
    pub fn from_yaml(yaml_str: &str) -> Result<Self> {
        serde_yaml::from_str(yaml_str)
            .map_err(|e| PipelineError::InvalidDefinition(format!("YAML parse error: {}", e)))
    }

    /// Load a definition file. `.yaml`/`.yml` are parsed as YAML, anything
    /// else as TOML.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::InvalidDefinition(format!("Failed to read {}: {}", path.display(), e))
        })?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&content),
            _ => Self::from_toml(&content),
        }
    }

    /// Serialize back to TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| PipelineError::InvalidDefinition(format!("TOML serialize error: {}", e)))
    }

    /// Structural checks that need no registry.
    ///
    /// Identity and reference checks happen in [`PipelineBuilder::build`];
    /// this only rejects blank fields the builder cannot catch.
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.name.trim().is_empty() {
            return Err(PipelineError::InvalidDefinition(
                "Pipeline name cannot be empty".into(),
            ));
        }

        for agent in &self.agents {
            if agent.id.trim().is_empty() {
                return Err(PipelineError::InvalidDefinition(
                    "Agent id cannot be empty".into(),
                ));
            }
            if agent.role.role.trim().is_empty() {
                return Err(PipelineError::InvalidDefinition(format!(
                    "Agent '{}' has no role",
                    agent.id
                )));
            }
        }

        for step in &self.steps {
            if step.id.trim().is_empty() {
                return Err(PipelineError::InvalidDefinition(
                    "Step id cannot be empty".into(),
                ));
            }
            if step.goal.trim().is_empty() {
                return Err(PipelineError::InvalidDefinition(format!(
                    "Step '{}' has no description",
                    step.id
                )));
            }
        }
        Ok(())
    }

    /// Capability names referenced anywhere in the file, sorted.
    pub fn capability_names(&self) -> Vec<String> {
        let mut names: HashSet<&str> = HashSet::new();
        for agent in &self.agents {
            names.extend(agent.capabilities.iter().map(|s| s.as_str()));
            names.insert(agent.role.reasoner_name());
        }
        let mut names: Vec<String> = names.into_iter().map(String::from).collect();
        names.sort();
        names
    }

    /// Convert into a builder.
    pub fn into_builder(self) -> PipelineBuilder {
        let builder = PipelineBuilder::new(self.pipeline.name)
            .description(self.pipeline.description)
            .discipline(self.pipeline.discipline);
        let builder = self.agents.into_iter().fold(builder, |b, a| b.actor(a));
        self.steps.into_iter().fold(builder, |b, s| b.step(s))
    }

    /// Validate and build the pipeline against a registry.
    pub fn build(self, registry: &CapabilityRegistry) -> Result<Pipeline> {
        self.validate()?;
        self.into_builder().build(registry)
    }
}
