//! Pipeline execution.
//!
//! [`PipelineRunner`] executes a [`Pipeline`] group by group against a fresh
//! [`RunContext`]. Execution is fail-fast: the first step error ends the run
//! and no later group starts.

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::actor::InvocationPolicy;
use crate::context::RunContext;
use crate::error::PipelineError;
use crate::pipeline::Pipeline;
use crate::step::Step;

/// Outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunResult {
    /// Every step succeeded; `output` is the last step's output.
    Completed { output: String },
    /// The run stopped at `step_id`.
    Failed { step_id: String, cause: String },
}

impl RunResult {
    /// Whether the run completed.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// Final output of a completed run.
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::Completed { output } => Some(output),
            Self::Failed { .. } => None,
        }
    }

    /// Step that failed, if any.
    pub fn failed_step(&self) -> Option<&str> {
        match self {
            Self::Completed { .. } => None,
            Self::Failed { step_id, .. } => Some(step_id),
        }
    }
}

/// Full record of a run: the result plus everything observed along the way.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Unique id for this run.
    pub run_id: Uuid,
    /// Pipeline name.
    pub pipeline: String,
    /// Wall-clock start.
    pub started_at: DateTime<Utc>,
    /// Total run time in milliseconds.
    pub elapsed_ms: u64,
    /// Steps whose execution began, in order.
    pub executed: Vec<String>,
    /// Outcome.
    pub result: RunResult,
    /// Inputs and every recorded output.
    pub context: RunContext,
}

/// Executes pipelines under an invocation policy.
#[derive(Debug, Clone, Default)]
pub struct PipelineRunner {
    policy: InvocationPolicy,
}

impl PipelineRunner {
    /// Create a runner with the given policy.
    pub fn new(policy: InvocationPolicy) -> Self {
        Self { policy }
    }

    /// The policy applied to every invocation.
    pub fn policy(&self) -> &InvocationPolicy {
        &self.policy
    }

    /// Run a pipeline with no inputs.
    pub async fn run(&self, pipeline: &Pipeline) -> RunResult {
        self.run_with_inputs(pipeline, HashMap::new()).await.result
    }

    /// Run a pipeline with `{{input.*}}` values and return the full report.
    pub async fn run_with_inputs(
        &self,
        pipeline: &Pipeline,
        inputs: HashMap<String, String>,
    ) -> RunReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();
        let span = info_span!("pipeline_run", pipeline = %pipeline.name(), %run_id);

        let (executed, result, context) = self
            .execute(pipeline, RunContext::with_inputs(inputs))
            .instrument(span)
            .await;

        RunReport {
            run_id,
            pipeline: pipeline.name().to_string(),
            started_at,
            elapsed_ms: clock.elapsed().as_millis() as u64,
            executed,
            result,
            context,
        }
    }

    async fn execute(
        &self,
        pipeline: &Pipeline,
        mut context: RunContext,
    ) -> (Vec<String>, RunResult, RunContext) {
        info!(steps = pipeline.len(), discipline = ?pipeline.discipline(), "Pipeline started");
        let mut executed = Vec::with_capacity(pipeline.len());

        for group in pipeline.groups() {
            executed.extend(group.iter().map(|s| s.id().to_string()));

            let failure = match group.as_slice() {
                [step] => self.run_single(step, &mut context).await,
                steps => self.run_group(steps, &mut context).await,
            };

            if let Some((step_id, err)) = failure {
                warn!(step = %step_id, error = %err, "Pipeline failed");
                let result = RunResult::Failed {
                    step_id,
                    cause: err.cause(),
                };
                return (executed, result, context);
            }
        }

        let output = pipeline
            .last_step()
            .and_then(|s| context.get(s.id()))
            .unwrap_or_default()
            .to_string();
        info!(outputs = context.len(), "Pipeline completed");
        (executed, RunResult::Completed { output }, context)
    }

    async fn run_single(
        &self,
        step: &Step,
        context: &mut RunContext,
    ) -> Option<(String, PipelineError)> {
        let span = info_span!("step", step = %step.id(), actor = %step.actor().id());
        async {
            debug!("Step started");
            match step.execute(context, &self.policy).await {
                Ok(output) => {
                    info!(bytes = output.len(), "Step completed");
                    None
                }
                Err(err) => Some((step.id().to_string(), err)),
            }
        }
        .instrument(span)
        .await
    }

    /// Run a group against one snapshot of the context. Outputs are recorded
    /// in declaration order once every member has finished; the reported
    /// failure is the first in declaration order.
    async fn run_group(
        &self,
        steps: &[Step],
        context: &mut RunContext,
    ) -> Option<(String, PipelineError)> {
        debug!(members = steps.len(), "Parallel group started");
        let snapshot: &RunContext = context;
        let results = join_all(steps.iter().map(|step| {
            let span = info_span!("step", step = %step.id(), actor = %step.actor().id());
            step.run(snapshot, &self.policy).instrument(span)
        }))
        .await;

        let mut failure = None;
        for (step, result) in steps.iter().zip(results) {
            let outcome = result.and_then(|output| context.insert(step.id(), output));
            if let Err(err) = outcome {
                failure.get_or_insert((step.id().to_string(), err));
            }
        }
        if failure.is_none() {
            info!(members = steps.len(), "Parallel group completed");
        }
        failure
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::actor::RoleConfig;
    use crate::capability::{CapabilityRegistry, StubCapability};
    use crate::pipeline::{ActorSpec, Discipline, PipelineBuilder, StepSpec};

    fn registry(reasoner: Arc<StubCapability>) -> CapabilityRegistry {
        let mut registry = CapabilityRegistry::new();
        registry.register(StubCapability::new("web_search"));
        registry.register_arc(reasoner);
        registry
    }

    #[test]
    fn test_run_result_accessors() {
        let ok = RunResult::Completed {
            output: "done".into(),
        };
        assert!(ok.is_completed());
        assert_eq!(ok.output(), Some("done"));
        assert_eq!(ok.failed_step(), None);

        let failed = RunResult::Failed {
            step_id: "extract".into(),
            cause: "timeout".into(),
        };
        assert!(!failed.is_completed());
        assert_eq!(failed.failed_step(), Some("extract"));
    }

    #[test]
    fn test_run_result_serializes_tagged() {
        let failed = RunResult::Failed {
            step_id: "extract".into(),
            cause: "timeout".into(),
        };
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["step_id"], "extract");
    }

    #[tokio::test]
    async fn test_inputs_flow_into_goal() {
        let reasoner =
            Arc::new(StubCapability::new("reason").with_fallback("Final Answer: mapped"));
        let registry = registry(reasoner.clone());
        let pipeline = PipelineBuilder::new("docs")
            .actor(ActorSpec::new("nav", RoleConfig::new("Navigator")))
            .step(StepSpec::new("map", "nav", "Map {{input.url}}"))
            .build(&registry)
            .unwrap();

        let mut inputs = HashMap::new();
        inputs.insert("url".to_string(), "https://example.com/docs".to_string());
        let report = PipelineRunner::default()
            .run_with_inputs(&pipeline, inputs)
            .await;

        assert_eq!(report.pipeline, "docs");
        assert_eq!(report.executed, vec!["map"]);
        assert_eq!(report.result.output(), Some("mapped"));
        assert!(reasoner.calls()[0].contains("Map https://example.com/docs"));
    }

    #[tokio::test]
    async fn test_missing_input_fails_step() {
        let registry = registry(Arc::new(StubCapability::new("reason")));
        let pipeline = PipelineBuilder::new("docs")
            .actor(ActorSpec::new("nav", RoleConfig::new("Navigator")))
            .step(StepSpec::new("map", "nav", "Map {{input.url}}"))
            .build(&registry)
            .unwrap();

        let result = PipelineRunner::default().run(&pipeline).await;
        match result {
            RunResult::Failed { step_id, cause } => {
                assert_eq!(step_id, "map");
                assert!(cause.contains("unknown run input 'url'"));
            }
            other => panic!("Expected Failed, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_group_members_see_same_snapshot() {
        let reasoner = Arc::new(StubCapability::new("reason").with_fallback("Final Answer: out"));
        let registry = registry(reasoner.clone());
        let pipeline = PipelineBuilder::new("fan")
            .discipline(Discipline::ParallelGroups)
            .actor(ActorSpec::new("nav", RoleConfig::new("Navigator")))
            .step(StepSpec::new("seed", "nav", "Seed"))
            .step(StepSpec::new("a", "nav", "A").in_group("g"))
            .step(StepSpec::new("b", "nav", "B").in_group("g"))
            .build(&registry)
            .unwrap();

        let report = PipelineRunner::default()
            .run_with_inputs(&pipeline, HashMap::new())
            .await;
        assert!(report.result.is_completed());
        assert_eq!(report.context.step_ids(), vec!["seed", "a", "b"]);

        let prompts = reasoner.calls();
        let group_prompts: Vec<&String> = prompts
            .iter()
            .filter(|p| p.contains("# Current task\nA") || p.contains("# Current task\nB"))
            .collect();
        assert_eq!(group_prompts.len(), 2);
        for prompt in group_prompts {
            assert!(prompt.contains("## seed"));
            assert!(!prompt.contains("## a\n"));
            assert!(!prompt.contains("## b\n"));
        }
    }
}
