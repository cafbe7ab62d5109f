//! Argument parsing for capability inputs.
//!
//! Reasoners pass either bare text (`https://example.com`) or a small JSON
//! object (`{"url": "https://example.com"}`). Both forms are accepted.

use serde_json::Value;

use crate::error::{Result, ToolError};

/// Extract a named argument from a capability input.
///
/// A JSON object input yields its string field `key`; anything else yields
/// the trimmed input itself.
pub fn argument(input: &str, key: &str) -> Result<String> {
    let trimmed = input.trim();
    if trimmed.starts_with('{') {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
            return match map.get(key).and_then(Value::as_str) {
                Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
                _ => Err(ToolError::InvalidInput(format!("missing '{}' field", key))),
            };
        }
    }
    if trimmed.is_empty() {
        return Err(ToolError::InvalidInput(format!("empty {}", key)));
    }
    Ok(trimmed.to_string())
}

/// Extract two arguments: JSON `{a, b}` or whitespace-separated `a rest...`.
pub fn argument_pair(input: &str, first: &str, second: &str) -> Result<(String, String)> {
    let trimmed = input.trim();
    if trimmed.starts_with('{') && serde_json::from_str::<Value>(trimmed).is_ok() {
        return Ok((argument(trimmed, first)?, argument(trimmed, second)?));
    }
    match trimmed.split_once(char::is_whitespace) {
        Some((a, b)) if !b.trim().is_empty() => Ok((a.to_string(), b.trim().to_string())),
        _ => Err(ToolError::InvalidInput(format!(
            "expected '<{}> <{}>', got '{}'",
            first, second, trimmed
        ))),
    }
}
