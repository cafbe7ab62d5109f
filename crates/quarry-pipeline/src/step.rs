//! Steps: units of pipeline work bound to one actor.

use std::sync::Arc;

use tracing::debug;

use crate::actor::{Actor, InvocationPolicy};
use crate::context::RunContext;
use crate::error::{PipelineError, Result};

/// One unit of pipeline work.
#[derive(Debug, Clone)]
pub struct Step {
    id: String,
    actor: Arc<Actor>,
    goal: String,
    expected_output: String,
    capabilities: Vec<String>,
    context: Vec<String>,
}

impl Step {
    /// Create a step performed by `actor`.
    ///
    /// Fails with [`PipelineError::CapabilityNotOwned`] if any requested
    /// capability is not bound to the actor.
    pub fn new<I, S>(
        id: impl Into<String>,
        actor: Arc<Actor>,
        goal: impl Into<String>,
        expected_output: impl Into<String>,
        capabilities: I,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = id.into();
        let mut requested: Vec<String> = Vec::new();
        for name in capabilities {
            let name = name.into();
            if !actor.owns(&name) {
                return Err(PipelineError::CapabilityNotOwned {
                    step: id,
                    actor: actor.id().to_string(),
                    capability: name,
                });
            }
            if !requested.contains(&name) {
                requested.push(name);
            }
        }

        Ok(Self {
            id,
            actor,
            goal: goal.into(),
            expected_output: expected_output.into(),
            capabilities: requested,
            context: Vec::new(),
        })
    }

    /// Restrict the prior outputs this step sees to the named steps.
    pub fn with_context<I, S>(mut self, step_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.context = step_ids.into_iter().map(Into::into).collect();
        self
    }

    /// The step's identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The actor performing this step.
    pub fn actor(&self) -> &Arc<Actor> {
        &self.actor
    }

    /// Natural-language goal (may contain templates).
    pub fn goal(&self) -> &str {
        &self.goal
    }

    /// Free-text contract for the output.
    pub fn expected_output(&self) -> &str {
        &self.expected_output
    }

    /// Capabilities this step may invoke.
    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    /// Steps whose outputs this step reads. Empty means all prior outputs.
    pub fn context(&self) -> &[String] {
        &self.context
    }

    /// Produce this step's output without recording it.
    pub async fn run(&self, context: &RunContext, policy: &InvocationPolicy) -> Result<String> {
        self.actor.invoke(self, context, policy).await
    }

    /// Produce this step's output and record it under the step's id.
    ///
    /// On failure nothing is recorded and the actor's error is returned as is.
    pub async fn execute(
        &self,
        context: &mut RunContext,
        policy: &InvocationPolicy,
    ) -> Result<String> {
        let output = self.run(context, policy).await?;
        context.insert(&self.id, output.clone())?;
        debug!(step = %self.id, bytes = output.len(), "Step output recorded");
        Ok(output)
    }
}
