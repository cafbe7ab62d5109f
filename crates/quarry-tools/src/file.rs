//! File reading capability.

use async_trait::async_trait;
use quarry_pipeline::{Capability, InvocationFailure};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{Result, ToolError};
use crate::input::argument;
use crate::sanitize::{OutputConfig, sanitize_output};

/// Reads UTF-8 files, optionally confined to a root directory.
#[derive(Debug, Clone)]
pub struct FileRead {
    root: Option<PathBuf>,
    output: OutputConfig,
}

impl Default for FileRead {
    fn default() -> Self {
        Self {
            root: None,
            output: OutputConfig::for_file_read(),
        }
    }
}

impl FileRead {
    /// Unrestricted file reader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict reads to paths under `root`. Relative inputs resolve against it.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Override the output limits.
    pub fn with_output(mut self, output: OutputConfig) -> Self {
        self.output = output;
        self
    }

    fn resolve_path(&self, raw: &str) -> Result<PathBuf> {
        let path = Path::new(raw);
        let Some(root) = &self.root else {
            return Ok(path.to_path_buf());
        };

        let root = root
            .canonicalize()
            .map_err(|e| {
                ToolError::Config(format!("Invalid file root {}: {}", root.display(), e))
            })?;
        let full = if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        };
        let canonical = full
            .canonicalize()
            .map_err(|_| ToolError::InvalidInput(format!("File not found: {}", raw)))?;

        if !canonical.starts_with(&root) {
            return Err(ToolError::OutsideRoot(raw.to_string()));
        }
        Ok(canonical)
    }

    /// Read the file named by `input`.
    pub async fn read(&self, input: &str) -> Result<String> {
        let raw = argument(input, "path")?;
        let path = self.resolve_path(&raw)?;

        let metadata = fs::metadata(&path)
            .await
            .map_err(|_| ToolError::InvalidInput(format!("File not found: {}", path.display())))?;
        if !metadata.is_file() {
            return Err(ToolError::InvalidInput(format!(
                "Path is not a file: {}",
                path.display()
            )));
        }

        let content = fs::read_to_string(&path).await?;
        let (content, truncated) = sanitize_output(&content, &self.output)?;
        tracing::debug!(path = %path.display(), bytes = content.len(), truncated, "Read file");
        Ok(content)
    }
}

#[async_trait]
impl Capability for FileRead {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read the contents of a text file. Input: the file path."
    }

    async fn invoke(&self, input: &str) -> std::result::Result<String, InvocationFailure> {
        self.read(input).await.map_err(|e| e.into_failure(self.name()))
    }
}
