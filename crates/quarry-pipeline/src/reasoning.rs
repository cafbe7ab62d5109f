//! Text protocol between an actor and its reasoning engine.
//!
//! The reasoning engine is an opaque text-in/text-out capability, so tool use
//! is negotiated in plain text. The actor sends a transcript; the engine
//! replies either with a final answer or with a request to invoke one
//! capability:
//!
//! ```text
//! Action: scrape_website
//! Action Input: https://langchain-ai.github.io/langgraph/concepts/
//! ```
//!
//! ```text
//! Final Answer: The documentation is organised into four sections...
//! ```
//!
//! A reply that matches neither shape is taken as the final answer verbatim.

use crate::actor::RoleConfig;
use crate::context::RunContext;

const ACTION_PREFIX: &str = "Action:";
const ACTION_INPUT_PREFIX: &str = "Action Input:";
const FINAL_ANSWER_PREFIX: &str = "Final Answer:";
const OBSERVATION_PREFIX: &str = "Observation:";

/// A parsed reply from the reasoning engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReasoningReply {
    /// The step's output.
    Final(String),
    /// A request to invoke a capability.
    Action { capability: String, input: String },
}

/// Parse a reasoning engine reply.
///
/// Both markers count only at the start of a line. `Final Answer:` wins over
/// an `Action:` in the same reply.
pub fn parse_reply(text: &str) -> ReasoningReply {
    if let Some(idx) = find_at_line_start(text, FINAL_ANSWER_PREFIX) {
        let answer = text[idx + FINAL_ANSWER_PREFIX.len()..].trim();
        return ReasoningReply::Final(answer.to_string());
    }

    let action = text
        .lines()
        .find_map(|line| line.trim().strip_prefix(ACTION_PREFIX))
        .map(|name| name.trim().trim_matches('`').to_string());

    match action {
        Some(capability) if !capability.is_empty() => {
            let input = text
                .find(ACTION_INPUT_PREFIX)
                .map(|idx| {
                    let rest = &text[idx + ACTION_INPUT_PREFIX.len()..];
                    let rest = match rest.find(OBSERVATION_PREFIX) {
                        Some(end) => &rest[..end],
                        None => rest,
                    };
                    strip_quotes(rest.trim()).to_string()
                })
                .unwrap_or_default();
            ReasoningReply::Action { capability, input }
        }
        _ => ReasoningReply::Final(text.trim().to_string()),
    }
}

/// Byte offset of the first `marker` preceded only by whitespace on its line.
fn find_at_line_start(text: &str, marker: &str) -> Option<usize> {
    text.match_indices(marker).map(|(idx, _)| idx).find(|&idx| {
        text[..idx]
            .rsplit('\n')
            .next()
            .is_none_or(|before| before.trim().is_empty())
    })
}

fn strip_quotes(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(s)
}

/// Everything the opening prompt is composed from.
#[derive(Debug)]
pub struct PromptParts<'a> {
    pub role: &'a RoleConfig,
    /// Goal with templates already resolved.
    pub task: &'a str,
    /// Expected output with templates already resolved.
    pub expected_output: &'a str,
    /// `(name, description)` of the capabilities the step may call.
    pub capabilities: Vec<(&'a str, &'a str)>,
    /// Prior outputs visible to the step, in run order.
    pub prior_outputs: Vec<(&'a str, &'a str)>,
}

/// Compose the opening transcript for a step.
pub fn compose_prompt(parts: &PromptParts<'_>) -> String {
    let mut prompt = format!("You are {}.\n", parts.role.role.trim());
    if !parts.role.backstory.trim().is_empty() {
        prompt.push_str(parts.role.backstory.trim());
        prompt.push('\n');
    }
    if !parts.role.goal.trim().is_empty() {
        prompt.push_str(&format!("\nYour personal goal is: {}\n", parts.role.goal.trim()));
    }

    if parts.capabilities.is_empty() {
        prompt.push_str("\nYou have no capabilities available. Answer directly.\n");
    } else {
        prompt.push_str("\nYou have access to the following capabilities:\n");
        for (name, description) in &parts.capabilities {
            prompt.push_str(&format!("- {}: {}\n", name, description));
        }
        let names: Vec<&str> = parts.capabilities.iter().map(|(n, _)| *n).collect();
        prompt.push_str(&format!(
            "\nTo use a capability, reply with exactly:\n{} <one of [{}]>\n{} <text input>\n",
            ACTION_PREFIX,
            names.join(", "),
            ACTION_INPUT_PREFIX
        ));
    }
    prompt.push_str(&format!(
        "\nWhen you have the result, reply with:\n{} <your complete answer>\n",
        FINAL_ANSWER_PREFIX
    ));

    if !parts.prior_outputs.is_empty() {
        prompt.push_str("\n# Context from previous steps\n");
        for (step_id, output) in &parts.prior_outputs {
            prompt.push_str(&format!("\n## {}\n{}\n", step_id, output.trim()));
        }
    }

    prompt.push_str(&format!("\n# Current task\n{}\n", parts.task.trim()));
    if !parts.expected_output.trim().is_empty() {
        prompt.push_str(&format!(
            "\nThis is the expected criteria for your final answer: {}\n",
            parts.expected_output.trim()
        ));
    }
    prompt
}

/// Append one reasoning round and its observation to the transcript.
pub fn append_observation(transcript: &mut String, reply: &str, observation: &str) {
    transcript.push('\n');
    transcript.push_str(reply.trim());
    transcript.push('\n');
    transcript.push_str(OBSERVATION_PREFIX);
    transcript.push(' ');
    transcript.push_str(observation.trim());
    transcript.push('\n');
}

/// Prior outputs a step may see: the named steps, or every output so far.
pub fn visible_outputs<'a>(context: &'a RunContext, only: &[String]) -> Vec<(&'a str, &'a str)> {
    context
        .outputs()
        .iter()
        .filter(|entry| only.is_empty() || only.iter().any(|id| *id == entry.step_id))
        .map(|entry| (entry.step_id.as_str(), entry.output.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_final_answer() {
        let reply = "Thought: done\nFinal Answer: the map is ready";
        assert_eq!(
            parse_reply(reply),
            ReasoningReply::Final("the map is ready".to_string())
        );
    }

    #[test]
    fn test_parse_action() {
        let reply =
            "Thought: I should look\nAction: scrape_website\nAction Input: \"https://example.com\"";
        assert_eq!(
            parse_reply(reply),
            ReasoningReply::Action {
                capability: "scrape_website".to_string(),
                input: "https://example.com".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_action_stops_at_observation() {
        let reply = "Action: web_search\nAction Input: langgraph docs\nObservation: hallucinated";
        assert_eq!(
            parse_reply(reply),
            ReasoningReply::Action {
                capability: "web_search".to_string(),
                input: "langgraph docs".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_action_without_input() {
        let reply = "Action: file_read";
        assert_eq!(
            parse_reply(reply),
            ReasoningReply::Action {
                capability: "file_read".to_string(),
                input: String::new(),
            }
        );
    }

    #[test]
    fn test_final_answer_wins() {
        let reply = "Action: web_search\nAction Input: x\nFinal Answer: enough";
        assert_eq!(parse_reply(reply), ReasoningReply::Final("enough".to_string()));
    }

    #[test]
    fn test_final_answer_inside_action_input_is_data() {
        let reply = "Action: web_search\nAction Input: \"Final Answer: meaning\"";
        assert_eq!(
            parse_reply(reply),
            ReasoningReply::Action {
                capability: "web_search".to_string(),
                input: "Final Answer: meaning".to_string(),
            }
        );
    }

    #[test]
    fn test_indented_final_answer() {
        let reply = "Thought: done\n   Final Answer: ok";
        assert_eq!(parse_reply(reply), ReasoningReply::Final("ok".to_string()));
    }

    #[test]
    fn test_plain_text_is_final() {
        assert_eq!(
            parse_reply("  just an answer \n"),
            ReasoningReply::Final("just an answer".to_string())
        );
    }

    #[test]
    fn test_compose_prompt_sections() {
        let role = RoleConfig {
            role: "Documentation Navigator".into(),
            goal: "Map the docs".into(),
            backstory: "You know site structures.".into(),
            reasoner: None,
        };
        let parts = PromptParts {
            role: &role,
            task: "Map https://example.com",
            expected_output: "A list of pages",
            capabilities: vec![("web_search", "Search the web")],
            prior_outputs: vec![("seed", "previous text")],
        };
        let prompt = compose_prompt(&parts);
        assert!(prompt.starts_with("You are Documentation Navigator."));
        assert!(prompt.contains("- web_search: Search the web"));
        assert!(prompt.contains("one of [web_search]"));
        assert!(prompt.contains("## seed\nprevious text"));
        assert!(prompt.contains("# Current task\nMap https://example.com"));
        assert!(prompt.contains("expected criteria for your final answer: A list of pages"));
    }

    #[test]
    fn test_compose_prompt_without_capabilities() {
        let role = RoleConfig {
            role: "Reviewer".into(),
            ..Default::default()
        };
        let parts = PromptParts {
            role: &role,
            task: "Review",
            expected_output: "",
            capabilities: vec![],
            prior_outputs: vec![],
        };
        let prompt = compose_prompt(&parts);
        assert!(prompt.contains("no capabilities available"));
        assert!(!prompt.contains("Context from previous steps"));
    }

    #[test]
    fn test_visible_outputs_filter() {
        let mut ctx = RunContext::new();
        ctx.insert("map", "m").unwrap();
        ctx.insert("extract", "e").unwrap();

        assert_eq!(visible_outputs(&ctx, &[]).len(), 2);
        assert_eq!(
            visible_outputs(&ctx, &["extract".to_string()]),
            vec![("extract", "e")]
        );
    }

    #[test]
    fn test_append_observation() {
        let mut transcript = String::from("prompt");
        append_observation(&mut transcript, "Action: x\nAction Input: y", "result");
        assert!(transcript.ends_with("Action: x\nAction Input: y\nObservation: result\n"));
    }
}
