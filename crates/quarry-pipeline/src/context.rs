//! Per-run context and template resolution.
//!
//! A [`RunContext`] accumulates each step's output keyed by step id. It is
//! append-only: a key, once written, cannot be overwritten.
//!
//! # Template Syntax
//!
//! Step goals and expected outputs may embed `{{expression}}` templates that
//! are resolved against the context right before the step runs:
//!
//! - `{{input.name}}`: a run input supplied at kickoff
//! - `{{step_id}}`: the full output of an earlier step
//! - `{{step_id.output}}`: same as above, spelled out

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{PipelineError, Result};

/// Root key for run inputs in template expressions.
pub const INPUT_ROOT: &str = "input";

/// One step's recorded output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutput {
    /// Step that produced the output.
    pub step_id: String,
    /// The output text.
    pub output: String,
}

/// Accumulator of step outputs for a single pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunContext {
    inputs: HashMap<String, String>,
    outputs: Vec<StepOutput>,
}

impl RunContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context seeded with run inputs.
    pub fn with_inputs(inputs: HashMap<String, String>) -> Self {
        Self {
            inputs,
            outputs: Vec::new(),
        }
    }

    /// Look up a run input.
    pub fn input(&self, name: &str) -> Option<&str> {
        self.inputs.get(name).map(|s| s.as_str())
    }

    /// All run inputs.
    pub fn inputs(&self) -> &HashMap<String, String> {
        &self.inputs
    }

    /// Record a step's output. Fails if the step already has an entry.
    pub fn insert(&mut self, step_id: impl Into<String>, output: impl Into<String>) -> Result<()> {
        let step_id = step_id.into();
        if self.contains(&step_id) {
            return Err(PipelineError::ContextConflict(step_id));
        }
        self.outputs.push(StepOutput {
            step_id,
            output: output.into(),
        });
        Ok(())
    }

    /// Output of a step, if it has run.
    pub fn get(&self, step_id: &str) -> Option<&str> {
        self.outputs
            .iter()
            .find(|entry| entry.step_id == step_id)
            .map(|entry| entry.output.as_str())
    }

    /// Whether a step has recorded an output.
    pub fn contains(&self, step_id: &str) -> bool {
        self.outputs.iter().any(|entry| entry.step_id == step_id)
    }

    /// Number of recorded outputs.
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    /// Whether no step has recorded an output yet.
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Step ids in insertion order.
    pub fn step_ids(&self) -> Vec<&str> {
        self.outputs.iter().map(|e| e.step_id.as_str()).collect()
    }

    /// Recorded outputs in insertion order.
    pub fn outputs(&self) -> &[StepOutput] {
        &self.outputs
    }

    /// The most recently recorded output.
    pub fn last_output(&self) -> Option<&str> {
        self.outputs.last().map(|e| e.output.as_str())
    }

    /// Resolve all `{{...}}` templates in a string against this context.
    ///
    /// Substituted values are never scanned again, so an output that itself
    /// contains `{{...}}` text is passed through literally.
    pub fn resolve(&self, template: &str) -> Result<String> {
        let expressions = parse_template_expressions(template);
        if expressions.is_empty() {
            return Ok(template.to_string());
        }

        let mut result = String::with_capacity(template.len());
        let mut cursor = 0;
        for expr in &expressions {
            result.push_str(&template[cursor..expr.start]);
            result.push_str(self.resolve_expression(&expr.path)?);
            cursor = expr.end;
        }
        result.push_str(&template[cursor..]);
        Ok(result)
    }

    fn resolve_expression(&self, path: &str) -> Result<&str> {
        let segments: Vec<&str> = path.split('.').collect();
        match segments.as_slice() {
            [INPUT_ROOT, name] => self.input(name).ok_or_else(|| {
                PipelineError::Template(format!(
                    "'{{{{{}}}}}': unknown run input '{}'",
                    path, name
                ))
            }),
            [step] | [step, "output"] => self.get(step).ok_or_else(|| {
                PipelineError::Template(format!(
                    "'{{{{{}}}}}': no output recorded for step '{}'",
                    path, step
                ))
            }),
            _ => Err(PipelineError::Template(format!(
                "'{{{{{}}}}}': unsupported expression",
                path
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Template expression parsing
// ---------------------------------------------------------------------------

/// A parsed `{{expression}}` occurrence in a string.
#[derive(Debug)]
struct TemplateExpression {
    /// Byte range of the expression including braces.
    start: usize,
    end: usize,
    /// The inner path, e.g. `"input.url"`.
    path: String,
}

/// Find all `{{...}}` expressions in a string, left to right.
fn parse_template_expressions(s: &str) -> Vec<TemplateExpression> {
    let mut results = Vec::new();
    let mut offset = 0;

    while let Some(found) = s[offset..].find("{{") {
        let start = offset + found;
        let Some(close) = s[start..].find("}}") else {
            break; // Unclosed `{{`
        };
        let end = start + close + 2;
        let inner = s[start + 2..end - 2].trim();

        if !inner.is_empty() {
            results.push(TemplateExpression {
                start,
                end,
                path: inner.to_string(),
            });
        }
        offset = end;
    }

    results
}

/// Step ids referenced by `{{step}}` / `{{step.output}}` expressions.
///
/// Run inputs are skipped. Used at build time to reject references to steps
/// that are not declared earlier.
pub fn referenced_steps(template: &str) -> Vec<String> {
    parse_template_expressions(template)
        .into_iter()
        .filter_map(|expr| {
            let root = expr.path.split('.').next()?.to_string();
            (root != INPUT_ROOT).then_some(root)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_context() -> RunContext {
        let mut inputs = HashMap::new();
        inputs.insert(
            "url".to_string(),
            "https://langchain-ai.github.io/langgraph/".to_string(),
        );
        let mut ctx = RunContext::with_inputs(inputs);
        ctx.insert("map", "- /concepts\n- /how-tos").unwrap();
        ctx
    }

    #[test]
    fn test_insert_and_get() {
        let ctx = test_context();
        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx.get("map"), Some("- /concepts\n- /how-tos"));
        assert!(ctx.get("extract").is_none());
        assert_eq!(ctx.last_output(), Some("- /concepts\n- /how-tos"));
    }

    #[test]
    fn test_insert_is_append_only() {
        let mut ctx = test_context();
        let err = ctx.insert("map", "again").unwrap_err();
        assert!(matches!(err, PipelineError::ContextConflict(id) if id == "map"));
        assert_eq!(ctx.get("map"), Some("- /concepts\n- /how-tos"));
    }

    #[test]
    fn test_step_ids_keep_insertion_order() {
        let mut ctx = RunContext::new();
        ctx.insert("b", "2").unwrap();
        ctx.insert("a", "1").unwrap();
        assert_eq!(ctx.step_ids(), vec!["b", "a"]);
    }

    #[test]
    fn test_resolve_input() {
        let ctx = test_context();
        let out = ctx.resolve("Map the docs at {{input.url}}").unwrap();
        assert_eq!(out, "Map the docs at https://langchain-ai.github.io/langgraph/");
    }

    #[test]
    fn test_resolve_step_output() {
        let ctx = test_context();
        assert_eq!(
            ctx.resolve("Pages:\n{{map}}").unwrap(),
            "Pages:\n- /concepts\n- /how-tos"
        );
        assert_eq!(
            ctx.resolve("{{ map.output }}").unwrap(),
            "- /concepts\n- /how-tos"
        );
    }

    #[test]
    fn test_resolved_output_is_not_rescanned() {
        let mut ctx = test_context();
        ctx.insert("extract", "Jinja example: {{input.url}}").unwrap();
        let out = ctx.resolve("Process {{extract}} from {{input.url}}").unwrap();
        assert_eq!(
            out,
            "Process Jinja example: {{input.url}} from https://langchain-ai.github.io/langgraph/"
        );
    }

    #[test]
    fn test_resolve_repeated_expression() {
        let ctx = test_context();
        assert_eq!(
            ctx.resolve("{{map}} | {{ map }}").unwrap(),
            "- /concepts\n- /how-tos | - /concepts\n- /how-tos"
        );
    }

    #[test]
    fn test_resolve_unknown_input() {
        let ctx = test_context();
        let err = ctx.resolve("{{input.topic}}").unwrap_err();
        assert!(err.to_string().contains("unknown run input 'topic'"));
    }

    #[test]
    fn test_resolve_missing_step() {
        let ctx = test_context();
        let err = ctx.resolve("{{review}}").unwrap_err();
        assert!(err.to_string().contains("no output recorded for step 'review'"));
    }

    #[test]
    fn test_resolve_unsupported_path() {
        let ctx = test_context();
        assert!(ctx.resolve("{{map.output.deep}}").is_err());
    }

    #[test]
    fn test_no_templates_and_unclosed() {
        let ctx = test_context();
        assert_eq!(ctx.resolve("plain text").unwrap(), "plain text");
        assert_eq!(ctx.resolve("open {{ never closed").unwrap(), "open {{ never closed");
    }

    #[test]
    fn test_referenced_steps_skips_inputs() {
        let refs = referenced_steps("Use {{map}} and {{input.url}} and {{extract.output}}");
        assert_eq!(refs, vec!["map", "extract"]);
    }
}
