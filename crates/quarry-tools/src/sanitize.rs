//! Size-bounded output sanitization.
//!
//! Every capability output flows through [`sanitize_output`] before it reaches
//! a reasoning transcript, so one oversized page cannot swamp the prompt.

use crate::error::{Result, ToolError};

/// Default maximum output size (100KB).
pub const DEFAULT_MAX_OUTPUT_SIZE: usize = 100 * 1024;

/// Limits applied to capability output.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Maximum size in bytes before truncation.
    pub max_size_bytes: usize,
    /// Appended when output is truncated.
    pub truncation_message: String,
    /// Strip control characters other than newlines, tabs and carriage returns.
    pub strip_control_chars: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: DEFAULT_MAX_OUTPUT_SIZE,
            truncation_message: "\n\n[Output truncated - exceeded size limit]".to_string(),
            strip_control_chars: true,
        }
    }
}

impl OutputConfig {
    /// Config with the given size limit.
    pub fn with_max_size(max_size_bytes: usize) -> Self {
        Self {
            max_size_bytes,
            ..Default::default()
        }
    }

    /// Scraped page text (200KB).
    pub fn for_scrape() -> Self {
        Self::with_max_size(200 * 1024)
    }

    /// Search result listings (50KB).
    pub fn for_search() -> Self {
        Self::with_max_size(50 * 1024)
    }

    /// File contents (500KB).
    pub fn for_file_read() -> Self {
        Self::with_max_size(500 * 1024)
    }

    /// Set a custom truncation message.
    pub fn with_truncation_message(mut self, message: impl Into<String>) -> Self {
        self.truncation_message = message.into();
        self
    }
}

/// Sanitize capability output.
///
/// Rejects content that looks binary, strips null bytes and (optionally)
/// control characters, then truncates on a char boundary. Returns the
/// sanitized text and whether it was truncated.
pub fn sanitize_output(input: &str, config: &OutputConfig) -> Result<(String, bool)> {
    let check_len = input.len().min(8 * 1024);
    let null_bytes = input.as_bytes()[..check_len]
        .iter()
        .filter(|&&b| b == 0)
        .count();

    if null_bytes > 10 && null_bytes > check_len / 100 {
        return Err(ToolError::BinaryContent {
            null_bytes,
            checked_bytes: check_len,
        });
    }

    let mut output: String = if config.strip_control_chars {
        input
            .chars()
            .filter(|c| !c.is_control() || matches!(c, '\n' | '\t' | '\r'))
            .collect()
    } else {
        input.replace('\0', "")
    };

    if output.len() <= config.max_size_bytes {
        return Ok((output, false));
    }

    let budget = config
        .max_size_bytes
        .saturating_sub(config.truncation_message.len());
    let mut cut = budget;
    while cut > 0 && !output.is_char_boundary(cut) {
        cut -= 1;
    }
    output.truncate(cut);
    output.push_str(&config.truncation_message);
    Ok((output, true))
}
