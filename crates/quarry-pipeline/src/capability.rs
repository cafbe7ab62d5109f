//! Capability framework.
//!
//! A [`Capability`] is a named, opaque text-in/text-out operation: web search,
//! page scraping, file reading, or the reasoning engine itself. The core never
//! looks inside a capability; it only resolves capabilities by name through the
//! [`CapabilityRegistry`] and invokes them.
//!
//! # Example
//!
//! ```rust,ignore
//! use quarry_pipeline::{Capability, CapabilityRegistry, InvocationFailure};
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Capability for Echo {
//!     fn name(&self) -> &str { "echo" }
//!     fn description(&self) -> &str { "Returns its input" }
//!
//!     async fn invoke(&self, input: &str) -> Result<String, InvocationFailure> {
//!         Ok(input.to_string())
//!     }
//! }
//!
//! let mut registry = CapabilityRegistry::new();
//! registry.register(Echo);
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{InvocationFailure, PipelineError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Capability Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for opaque external operations invoked by actors.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Unique name used for registry lookup and in reasoning transcripts.
    fn name(&self) -> &str;

    /// Human-readable description shown to the reasoning engine.
    fn description(&self) -> &str;

    /// Invoke the capability with a text argument.
    async fn invoke(&self, input: &str) -> std::result::Result<String, InvocationFailure>;
}

/// A capability that can be shared across actors and tasks.
pub type SharedCapability = Arc<dyn Capability>;

/// Invoke a capability, converting an elapsed timeout into an ordinary
/// invocation failure.
pub async fn invoke_bounded(
    capability: &dyn Capability,
    input: &str,
    timeout: Duration,
) -> std::result::Result<String, InvocationFailure> {
    match tokio::time::timeout(timeout, capability.invoke(input)).await {
        Ok(result) => result,
        Err(_) => Err(InvocationFailure::new(
            capability.name(),
            format!("timed out after {}s", timeout.as_secs()),
        )),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Capability Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Name → capability table, populated at initialization and read-only after.
#[derive(Default, Clone)]
pub struct CapabilityRegistry {
    capabilities: HashMap<String, SharedCapability>,
}

impl CapabilityRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            capabilities: HashMap::new(),
        }
    }

    /// Register a capability, replacing any existing one with the same name.
    pub fn register<C: Capability + 'static>(&mut self, capability: C) {
        let name = capability.name().to_string();
        self.capabilities.insert(name, Arc::new(capability));
    }

    /// Register a capability from an Arc.
    pub fn register_arc(&mut self, capability: SharedCapability) {
        let name = capability.name().to_string();
        self.capabilities.insert(name, capability);
    }

    /// Resolve a capability by name.
    pub fn resolve(&self, name: &str) -> Result<SharedCapability> {
        self.capabilities
            .get(name)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownCapability(name.to_string()))
    }

    /// Check if a capability exists.
    pub fn contains(&self, name: &str) -> bool {
        self.capabilities.contains_key(name)
    }

    /// All capability names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.capabilities.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// `(name, description)` pairs, sorted by name.
    pub fn descriptions(&self) -> Vec<(String, String)> {
        self.names()
            .into_iter()
            .filter_map(|name| {
                self.capabilities
                    .get(name)
                    .map(|c| (name.to_string(), c.description().to_string()))
            })
            .collect()
    }

    /// Number of registered capabilities.
    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("capabilities", &self.names())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Function Capability
// ─────────────────────────────────────────────────────────────────────────────

type InvokeFn = dyn Fn(&str) -> std::result::Result<String, String> + Send + Sync;

/// A capability backed by a synchronous closure.
///
/// Handy for deterministic reasoners in tests and for dry runs.
pub struct FnCapability {
    name: String,
    description: String,
    f: Box<InvokeFn>,
}

impl FnCapability {
    /// Create a capability from a closure. An `Err(message)` becomes an
    /// [`InvocationFailure`].
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, f: F) -> Self
    where
        F: Fn(&str) -> std::result::Result<String, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            f: Box::new(f),
        }
    }
}

#[async_trait]
impl Capability for FnCapability {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn invoke(&self, input: &str) -> std::result::Result<String, InvocationFailure> {
        (self.f)(input).map_err(|message| InvocationFailure::new(&self.name, message))
    }
}

impl std::fmt::Debug for FnCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnCapability")
            .field("name", &self.name)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stub Capability
// ─────────────────────────────────────────────────────────────────────────────

/// A scripted capability for testing.
///
/// Returns queued responses in order, then the fallback. Records every input
/// so tests can count invocations.
#[derive(Debug)]
pub struct StubCapability {
    name: String,
    description: String,
    responses: Mutex<VecDeque<std::result::Result<String, String>>>,
    fallback: std::result::Result<String, String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl StubCapability {
    /// Create a stub that answers `"<name> ok"` until told otherwise.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            fallback: Ok(format!("{} ok", name)),
            description: format!("Stub capability {}", name),
            name,
            responses: Mutex::new(VecDeque::new()),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Queue a successful response.
    pub fn with_response(self, response: impl Into<String>) -> Self {
        self.responses.lock().push_back(Ok(response.into()));
        self
    }

    /// Queue a failure.
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.responses.lock().push_back(Err(message.into()));
        self
    }

    /// Response returned once the queue is drained.
    pub fn with_fallback(mut self, response: impl Into<String>) -> Self {
        self.fallback = Ok(response.into());
        self
    }

    /// Fail every call once the queue is drained.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.fallback = Err(message.into());
        self
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Inputs received so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Number of invocations so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl Capability for StubCapability {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn invoke(&self, input: &str) -> std::result::Result<String, InvocationFailure> {
        self.calls.lock().push(input.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self
            .responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        next.map_err(|message| InvocationFailure::new(&self.name, message))
    }
}
