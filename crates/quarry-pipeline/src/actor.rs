//! Actors: named entities bound to a fixed capability subset.
//!
//! An actor owns no reasoning of its own. It composes a prompt, hands it to
//! its reasoner capability, and gates every capability request the reasoner
//! makes against the step's authorized set.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::capability::{SharedCapability, invoke_bounded};
use crate::context::RunContext;
use crate::error::{PipelineError, Result};
use crate::reasoning::{
    PromptParts, ReasoningReply, append_observation, compose_prompt, parse_reply, visible_outputs,
};
use crate::step::Step;

/// Capability used as the reasoning engine when an actor names none.
pub const DEFAULT_REASONER: &str = "reason";

/// Free-text role configuration for an actor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleConfig {
    /// Short role title, e.g. "Documentation Navigator".
    pub role: String,
    /// The actor's standing goal.
    #[serde(default)]
    pub goal: String,
    /// Background that shapes the actor's answers.
    #[serde(default)]
    pub backstory: String,
    /// Reasoner capability name. Defaults to [`DEFAULT_REASONER`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoner: Option<String>,
}

impl RoleConfig {
    /// Create a role with just a title.
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            ..Default::default()
        }
    }

    /// Set the goal.
    pub fn with_goal(mut self, goal: impl Into<String>) -> Self {
        self.goal = goal.into();
        self
    }

    /// Set the backstory.
    pub fn with_backstory(mut self, backstory: impl Into<String>) -> Self {
        self.backstory = backstory.into();
        self
    }

    /// Use a specific reasoner capability.
    pub fn with_reasoner(mut self, reasoner: impl Into<String>) -> Self {
        self.reasoner = Some(reasoner.into());
        self
    }

    /// The reasoner capability name in effect.
    pub fn reasoner_name(&self) -> &str {
        self.reasoner.as_deref().unwrap_or(DEFAULT_REASONER)
    }
}

/// Limits applied to every capability invocation in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvocationPolicy {
    /// Upper bound on a single capability call.
    pub invocation_timeout: Duration,
    /// Upper bound on reasoning rounds per step.
    pub max_iterations: u32,
}

impl Default for InvocationPolicy {
    fn default() -> Self {
        Self {
            invocation_timeout: Duration::from_secs(120),
            max_iterations: 15,
        }
    }
}

/// A named entity bound to a fixed set of capabilities.
pub struct Actor {
    id: String,
    role: RoleConfig,
    capabilities: Vec<SharedCapability>,
    reasoner: SharedCapability,
}

impl Actor {
    /// Create an actor, resolving every capability (and the reasoner) in the
    /// registry.
    ///
    /// Fails with [`PipelineError::UnboundCapability`] on the first name the
    /// registry cannot resolve. Repeated names are bound once.
    pub fn new<I, S>(
        id: impl Into<String>,
        role: RoleConfig,
        capabilities: I,
        registry: &crate::capability::CapabilityRegistry,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let id = id.into();
        let unbound = |name: &str| PipelineError::UnboundCapability {
            actor: id.clone(),
            capability: name.to_string(),
        };

        let mut bound: Vec<SharedCapability> = Vec::new();
        for name in capabilities {
            let name = name.as_ref();
            if bound.iter().any(|c| c.name() == name) {
                continue;
            }
            let capability = registry.resolve(name).map_err(|_| unbound(name))?;
            bound.push(capability);
        }

        let reasoner = registry
            .resolve(role.reasoner_name())
            .map_err(|_| unbound(role.reasoner_name()))?;

        debug!(
            actor = %id,
            capabilities = bound.len(),
            reasoner = %role.reasoner_name(),
            "Actor bound"
        );

        Ok(Self {
            id,
            role,
            capabilities: bound,
            reasoner,
        })
    }

    /// The actor's identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The actor's role configuration.
    pub fn role(&self) -> &RoleConfig {
        &self.role
    }

    /// Names of the bound capabilities, in declaration order.
    pub fn capability_names(&self) -> Vec<&str> {
        self.capabilities.iter().map(|c| c.name()).collect()
    }

    /// Whether the actor is bound to a capability.
    pub fn owns(&self, name: &str) -> bool {
        self.capabilities.iter().any(|c| c.name() == name)
    }

    fn capability(&self, name: &str) -> Option<&SharedCapability> {
        self.capabilities.iter().find(|c| c.name() == name)
    }

    /// Perform a step.
    ///
    /// Rejects the step with [`PipelineError::CapabilityNotOwned`] when it
    /// requests a capability this actor is not bound to. Otherwise runs the
    /// reasoning loop: capability requests inside the step's set are invoked,
    /// anything else is denied and reported back to the reasoner.
    pub async fn invoke(
        &self,
        step: &Step,
        context: &RunContext,
        policy: &InvocationPolicy,
    ) -> Result<String> {
        if let Some(missing) = step.capabilities().iter().find(|c| !self.owns(c)) {
            return Err(PipelineError::CapabilityNotOwned {
                step: step.id().to_string(),
                actor: self.id.clone(),
                capability: missing.clone(),
            });
        }

        let task = context.resolve(step.goal())?;
        let expected_output = context.resolve(step.expected_output())?;
        let allowed: Vec<&SharedCapability> = step
            .capabilities()
            .iter()
            .filter_map(|name| self.capability(name))
            .collect();

        let mut transcript = compose_prompt(&PromptParts {
            role: &self.role,
            task: &task,
            expected_output: &expected_output,
            capabilities: allowed.iter().map(|c| (c.name(), c.description())).collect(),
            prior_outputs: visible_outputs(context, step.context()),
        });

        for iteration in 1..=policy.max_iterations {
            debug!(
                step = %step.id(),
                actor = %self.id,
                iteration,
                "Invoking reasoner"
            );
            let reply =
                invoke_bounded(self.reasoner.as_ref(), &transcript, policy.invocation_timeout)
                    .await?;

            match parse_reply(&reply) {
                ReasoningReply::Final(answer) => return Ok(answer),
                ReasoningReply::Action { capability, input } => {
                    let observation = match allowed.iter().find(|c| c.name() == capability) {
                        Some(cap) => {
                            debug!(
                                step = %step.id(),
                                capability = %capability,
                                "Invoking capability"
                            );
                            invoke_bounded(cap.as_ref(), &input, policy.invocation_timeout)
                                .await?
                        }
                        None => {
                            warn!(
                                step = %step.id(),
                                actor = %self.id,
                                capability = %capability,
                                "Denied capability outside the step's set"
                            );
                            format!(
                                "Error: capability '{}' is not available for this task",
                                capability
                            )
                        }
                    };
                    append_observation(&mut transcript, &reply, &observation);
                }
            }
        }

        Err(PipelineError::MaxIterationsExceeded {
            step: step.id().to_string(),
            max: policy.max_iterations,
        })
    }
}

impl std::fmt::Debug for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Actor")
            .field("id", &self.id)
            .field("role", &self.role.role)
            .field("capabilities", &self.capability_names())
            .field("reasoner", &self.reasoner.name())
            .finish()
    }
}

/// An actor shared between the steps it performs.
pub type SharedActor = Arc<Actor>;
