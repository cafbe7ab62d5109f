//! Error types for the concrete capabilities.

use quarry_pipeline::InvocationFailure;
use thiserror::Error;

/// Result type alias using the tool error type.
pub type Result<T> = std::result::Result<T, ToolError>;

/// Errors raised while a capability does its work.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The reasoner passed an argument the capability cannot use.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Transport failure or non-success HTTP status.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A path escaped the configured file root.
    #[error("Path is outside allowed directory: {0}")]
    OutsideRoot(String),

    /// Output looked like binary data.
    #[error("Output appears to be binary ({null_bytes} null bytes in first {checked_bytes} bytes)")]
    BinaryContent {
        null_bytes: usize,
        checked_bytes: usize,
    },

    /// Bad capability configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ToolError {
    /// Convert into the failure a pipeline run reports for `capability`.
    pub fn into_failure(self, capability: &str) -> InvocationFailure {
        InvocationFailure::new(capability, self.to_string())
    }
}

impl From<reqwest::Error> for ToolError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ToolError::Http(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            ToolError::Http(format!("Connection failed: {}", err))
        } else {
            ToolError::Http(err.to_string())
        }
    }
}
