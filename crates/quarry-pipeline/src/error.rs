//! Error types for the pipeline core.

use thiserror::Error;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// An opaque capability call failed or timed out.
///
/// Displays as the bare message so that run results carry exactly what the
/// capability reported.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct InvocationFailure {
    /// Name of the capability that failed.
    pub capability: String,
    /// Failure message reported by the capability.
    pub message: String,
}

impl InvocationFailure {
    /// Create a failure for the named capability.
    pub fn new(capability: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
            message: message.into(),
        }
    }
}

/// Errors that can occur while building or running a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Registry lookup miss.
    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    /// An actor references a capability the registry cannot resolve.
    #[error("Actor '{actor}' references unbound capability '{capability}'")]
    UnboundCapability { actor: String, capability: String },

    /// A step requests a capability outside its actor's set.
    #[error("Step '{step}' requests capability '{capability}' not owned by actor '{actor}'")]
    CapabilityNotOwned {
        step: String,
        actor: String,
        capability: String,
    },

    /// Two steps share an identifier.
    #[error("Duplicate step ID: {0}")]
    DuplicateStepId(String),

    /// Two actors share an identifier.
    #[error("Duplicate actor ID: {0}")]
    DuplicateActorId(String),

    /// A step names an actor that was never defined.
    #[error("Step '{step}' references unknown actor '{actor}'")]
    UnknownActor { step: String, actor: String },

    /// A step reads the output of a step that is not declared before it.
    #[error("Step '{step}' cannot read context from '{reference}': {reason}")]
    InvalidContextReference {
        step: String,
        reference: String,
        reason: String,
    },

    /// A pipeline with no steps.
    #[error("Pipeline must have at least one step")]
    EmptyPipeline,

    /// Malformed declarative definition.
    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),

    /// A capability call failed or timed out.
    #[error("Invocation of '{}' failed: {}", .0.capability, .0.message)]
    Invocation(#[from] InvocationFailure),

    /// A step tried to write a context key that already holds an output.
    #[error("Context already holds an output for '{0}'")]
    ContextConflict(String),

    /// The reasoning loop did not produce a final answer in time.
    #[error("Step '{step}' exceeded {max} reasoning iterations")]
    MaxIterationsExceeded { step: String, max: u32 },

    /// A `{{...}}` template could not be resolved.
    #[error("Template error: {0}")]
    Template(String),
}

impl PipelineError {
    /// Whether this error can only arise while building a pipeline.
    pub fn is_construction_error(&self) -> bool {
        !matches!(
            self,
            Self::Invocation(_)
                | Self::ContextConflict(_)
                | Self::MaxIterationsExceeded { .. }
                | Self::Template(_)
        )
    }

    /// The cause recorded in a failed run result.
    ///
    /// Invocation failures report the capability's own message; everything
    /// else uses the error's display form.
    pub fn cause(&self) -> String {
        match self {
            Self::Invocation(failure) => failure.message.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_failure_display_is_message() {
        let failure = InvocationFailure::new("scrape_website", "timeout");
        assert_eq!(failure.to_string(), "timeout");
    }

    #[test]
    fn test_cause_for_invocation() {
        let err: PipelineError = InvocationFailure::new("scrape_website", "timeout").into();
        assert_eq!(err.cause(), "timeout");
        assert!(err.to_string().contains("scrape_website"));
        assert!(!err.is_construction_error());
    }

    #[test]
    fn test_construction_errors() {
        assert!(PipelineError::DuplicateStepId("a".into()).is_construction_error());
        assert!(PipelineError::EmptyPipeline.is_construction_error());
        assert!(
            PipelineError::UnboundCapability {
                actor: "a".into(),
                capability: "x".into()
            }
            .is_construction_error()
        );
        assert!(!PipelineError::ContextConflict("a".into()).is_construction_error());
    }

    #[test]
    fn test_cause_for_other_errors() {
        let err = PipelineError::MaxIterationsExceeded {
            step: "map".into(),
            max: 3,
        };
        assert!(err.cause().contains("exceeded 3 reasoning iterations"));
    }
}
