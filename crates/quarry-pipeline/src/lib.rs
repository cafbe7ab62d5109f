//! Declarative multi-actor pipeline executor for Quarry.
//!
//! A pipeline is an ordered list of steps. Each step is performed by an actor,
//! a named role bound to a fixed subset of capabilities resolved from a
//! [`CapabilityRegistry`]. Steps run in declaration order; each one sees the
//! outputs of the steps before it, and the first failure ends the run.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   build()   ┌──────────────┐   run()   ┌─────────────┐
//! │ PipelineBuilder  │ ──────────▶ │   Pipeline   │ ────────▶ │  RunResult  │
//! │ ActorSpec        │             │ Step → Actor │           │  RunReport  │
//! │ StepSpec         │             └──────┬───────┘           └─────────────┘
//! └──────────────────┘                    │ invoke
//!                                 ┌───────▼────────┐
//!                                 │  Capabilities  │  reasoner, web_search,
//!                                 │   (registry)   │  scrape_website, ...
//!                                 └────────────────┘
//! ```
//!
//! Every failure mode that can be detected before running is reported by
//! [`PipelineBuilder::build`]; run-time failures surface as
//! [`RunResult::Failed`] and never panic.

pub mod actor;
pub mod capability;
pub mod context;
pub mod definition;
pub mod error;
pub mod pipeline;
pub mod reasoning;
pub mod runner;
pub mod step;

pub use actor::{Actor, DEFAULT_REASONER, InvocationPolicy, RoleConfig, SharedActor};
pub use capability::{
    Capability, CapabilityRegistry, FnCapability, SharedCapability, StubCapability, invoke_bounded,
};
pub use context::{RunContext, StepOutput};
pub use definition::{PipelineFile, PipelineMeta};
pub use error::{InvocationFailure, PipelineError, Result};
pub use pipeline::{ActorSpec, Discipline, Pipeline, PipelineBuilder, StepSpec};
pub use reasoning::{ReasoningReply, parse_reply};
pub use runner::{PipelineRunner, RunReport, RunResult};
pub use step::Step;

// Re-export so capability implementors don't need a direct dependency.
pub use async_trait::async_trait;
