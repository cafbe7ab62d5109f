//! Pipelines and the builder that validates them.
//!
//! A [`Pipeline`] is an ordered sequence of step groups. Under the sequential
//! discipline every group holds exactly one step. Under the parallel-groups
//! discipline a group may hold several independent steps that run together
//! behind a join barrier before the next group starts.
//!
//! [`PipelineBuilder`] collects actor and step definitions and performs every
//! construction-time check in one `build()` call.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::actor::{Actor, RoleConfig};
use crate::capability::CapabilityRegistry;
use crate::context::referenced_steps;
use crate::error::{PipelineError, Result};
use crate::step::Step;

/// How a pipeline's steps are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Discipline {
    /// One step at a time, in declaration order.
    #[default]
    Sequential,
    /// Ordered groups; members of a group run concurrently.
    ParallelGroups,
}

/// An ordered, validated collection of steps.
#[derive(Debug, Clone)]
pub struct Pipeline {
    name: String,
    description: String,
    discipline: Discipline,
    groups: Vec<Vec<Step>>,
}

impl Pipeline {
    /// Create a sequential pipeline.
    pub fn sequential(steps: Vec<Step>) -> Result<Self> {
        let groups = steps.into_iter().map(|s| vec![s]).collect();
        Self::from_groups(Discipline::Sequential, groups)
    }

    /// Create a pipeline of ordered parallel groups.
    pub fn grouped(groups: Vec<Vec<Step>>) -> Result<Self> {
        Self::from_groups(Discipline::ParallelGroups, groups)
    }

    fn from_groups(discipline: Discipline, groups: Vec<Vec<Step>>) -> Result<Self> {
        if groups.iter().all(|g| g.is_empty()) {
            return Err(PipelineError::EmptyPipeline);
        }
        if groups.iter().any(|g| g.is_empty()) {
            return Err(PipelineError::InvalidDefinition(
                "Parallel groups cannot be empty".into(),
            ));
        }
        if discipline == Discipline::Sequential && groups.iter().any(|g| g.len() > 1) {
            return Err(PipelineError::InvalidDefinition(
                "Parallel groups require the parallel_groups discipline".into(),
            ));
        }

        let mut seen = HashSet::new();
        for step in groups.iter().flatten() {
            if !seen.insert(step.id()) {
                return Err(PipelineError::DuplicateStepId(step.id().to_string()));
            }
        }

        validate_data_flow(&groups)?;

        Ok(Self {
            name: "pipeline".to_string(),
            description: String::new(),
            discipline,
            groups,
        })
    }

    /// Set the pipeline name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the pipeline description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// The pipeline name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The execution discipline fixed at construction.
    pub fn discipline(&self) -> Discipline {
        self.discipline
    }

    /// Step groups in execution order.
    pub fn groups(&self) -> &[Vec<Step>] {
        &self.groups
    }

    /// All steps in declaration order.
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.groups.iter().flatten()
    }

    /// Step ids in declaration order.
    pub fn step_ids(&self) -> Vec<&str> {
        self.steps().map(|s| s.id()).collect()
    }

    /// Look up a step by id.
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps().find(|s| s.id() == id)
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.len()).sum()
    }

    /// Always false for a constructed pipeline.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The step whose output becomes the pipeline's result.
    pub fn last_step(&self) -> Option<&Step> {
        self.groups.last().and_then(|g| g.last())
    }
}

/// Check that every context and template reference points to a step in an
/// earlier group.
fn validate_data_flow(groups: &[Vec<Step>]) -> Result<()> {
    let all: HashSet<&str> = groups.iter().flatten().map(|s| s.id()).collect();
    let mut earlier: HashSet<&str> = HashSet::new();

    for group in groups {
        let members: HashSet<&str> = group.iter().map(|s| s.id()).collect();
        for step in group {
            let templated = referenced_steps(step.goal())
                .into_iter()
                .chain(referenced_steps(step.expected_output()));
            let references: Vec<String> = step.context().iter().cloned().chain(templated).collect();

            for reference in references {
                if earlier.contains(reference.as_str()) {
                    continue;
                }
                let reason = if members.contains(reference.as_str()) {
                    if reference == step.id() {
                        "a step cannot read its own output"
                    } else {
                        "steps in the same parallel group cannot read each other"
                    }
                } else if all.contains(reference.as_str()) {
                    "the step is declared later"
                } else {
                    "no such step"
                };
                return Err(PipelineError::InvalidContextReference {
                    step: step.id().to_string(),
                    reference,
                    reason: reason.to_string(),
                });
            }
        }
        earlier.extend(members);
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Definitions
// ─────────────────────────────────────────────────────────────────────────────

/// Declarative actor definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorSpec {
    /// Unique actor identifier.
    pub id: String,

    /// Role, goal, backstory and reasoner.
    #[serde(flatten)]
    pub role: RoleConfig,

    /// Capabilities the actor is bound to.
    #[serde(default, alias = "tools")]
    pub capabilities: Vec<String>,
}

impl ActorSpec {
    /// Create an actor definition.
    pub fn new(id: impl Into<String>, role: RoleConfig) -> Self {
        Self {
            id: id.into(),
            role,
            capabilities: Vec::new(),
        }
    }

    /// Bind capabilities.
    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }
}

/// Declarative step definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSpec {
    /// Unique step identifier.
    pub id: String,

    /// Id of the actor performing the step.
    #[serde(alias = "agent")]
    pub actor: String,

    /// Natural-language goal; may contain `{{...}}` templates.
    #[serde(alias = "description")]
    pub goal: String,

    /// Free-text output contract.
    #[serde(default)]
    pub expected_output: String,

    /// Capabilities the step may invoke (subset of the actor's).
    #[serde(default, alias = "tools")]
    pub capabilities: Vec<String>,

    /// Earlier steps whose outputs this step reads. Empty means all.
    #[serde(default)]
    pub context: Vec<String>,

    /// Parallel group label. Consecutive steps sharing a label run together.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl StepSpec {
    /// Create a step definition.
    pub fn new(id: impl Into<String>, actor: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            actor: actor.into(),
            goal: goal.into(),
            expected_output: String::new(),
            capabilities: Vec::new(),
            context: Vec::new(),
            group: None,
        }
    }

    /// Set the expected output contract.
    pub fn with_expected_output(mut self, expected_output: impl Into<String>) -> Self {
        self.expected_output = expected_output.into();
        self
    }

    /// Request capabilities.
    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    /// Read only the named earlier steps.
    pub fn with_context<I, S>(mut self, step_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.context = step_ids.into_iter().map(Into::into).collect();
        self
    }

    /// Place the step in a parallel group.
    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Accumulates actor and step definitions and validates them in one place.
#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    name: String,
    description: String,
    discipline: Discipline,
    actors: Vec<ActorSpec>,
    steps: Vec<StepSpec>,
}

impl PipelineBuilder {
    /// Start a builder for a named pipeline.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the execution discipline.
    pub fn discipline(mut self, discipline: Discipline) -> Self {
        self.discipline = discipline;
        self
    }

    /// Add an actor definition.
    pub fn actor(mut self, actor: ActorSpec) -> Self {
        self.actors.push(actor);
        self
    }

    /// Add a step definition. Steps run in the order they are added.
    pub fn step(mut self, step: StepSpec) -> Self {
        self.steps.push(step);
        self
    }

    /// Validate every definition and build the pipeline.
    ///
    /// Returns the first failure in this order: empty pipeline, duplicate step
    /// ids, duplicate actor ids, unbound actor capabilities, unknown actors,
    /// step capabilities not owned by their actor, bad data-flow references,
    /// group layout.
    pub fn build(self, registry: &CapabilityRegistry) -> Result<Pipeline> {
        if self.steps.is_empty() {
            return Err(PipelineError::EmptyPipeline);
        }

        let mut step_ids = HashSet::new();
        for spec in &self.steps {
            if !step_ids.insert(spec.id.as_str()) {
                return Err(PipelineError::DuplicateStepId(spec.id.clone()));
            }
        }

        let mut actors: HashMap<&str, Arc<Actor>> = HashMap::new();
        for spec in &self.actors {
            if actors.contains_key(spec.id.as_str()) {
                return Err(PipelineError::DuplicateActorId(spec.id.clone()));
            }
            let actor = Actor::new(&spec.id, spec.role.clone(), &spec.capabilities, registry)?;
            actors.insert(spec.id.as_str(), Arc::new(actor));
        }

        let mut steps = Vec::with_capacity(self.steps.len());
        for spec in &self.steps {
            let actor = actors
                .get(spec.actor.as_str())
                .cloned()
                .ok_or_else(|| PipelineError::UnknownActor {
                    step: spec.id.clone(),
                    actor: spec.actor.clone(),
                })?;
            let step = Step::new(
                &spec.id,
                actor,
                &spec.goal,
                &spec.expected_output,
                &spec.capabilities,
            )?
            .with_context(&spec.context);
            steps.push((spec.group.as_deref(), step));
        }

        let pipeline = match self.discipline {
            Discipline::Sequential => {
                if let Some((label, step)) = steps.iter().find(|(label, _)| label.is_some()) {
                    return Err(PipelineError::InvalidDefinition(format!(
                        "Step '{}' is in group '{}' but the pipeline is sequential",
                        step.id(),
                        label.unwrap_or_default()
                    )));
                }
                Pipeline::sequential(steps.into_iter().map(|(_, s)| s).collect())?
            }
            Discipline::ParallelGroups => Pipeline::grouped(group_steps(steps)?)?,
        };

        debug!(
            pipeline = %self.name,
            steps = pipeline.len(),
            groups = pipeline.groups().len(),
            "Pipeline built"
        );

        Ok(pipeline
            .with_name(self.name)
            .with_description(self.description))
    }
}

/// Fold consecutive steps sharing a group label into one group. Unlabelled
/// steps form singleton groups.
fn group_steps(steps: Vec<(Option<&str>, Step)>) -> Result<Vec<Vec<Step>>> {
    let mut groups: Vec<Vec<Step>> = Vec::new();
    let mut current: Option<&str> = None;
    let mut closed: HashSet<&str> = HashSet::new();

    for (label, step) in steps {
        match label {
            Some(label) if current == Some(label) => {
                if let Some(group) = groups.last_mut() {
                    group.push(step);
                }
            }
            Some(label) => {
                if closed.contains(label) {
                    return Err(PipelineError::InvalidDefinition(format!(
                        "Group '{}' is not contiguous (step '{}')",
                        label,
                        step.id()
                    )));
                }
                if let Some(previous) = current {
                    closed.insert(previous);
                }
                current = Some(label);
                groups.push(vec![step]);
            }
            None => {
                if let Some(previous) = current.take() {
                    closed.insert(previous);
                }
                groups.push(vec![step]);
            }
        }
    }
    Ok(groups)
}
