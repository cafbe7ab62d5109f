//! Errors from loading and resolving `quarry.toml` files.

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Neither `api_key` nor the backend's key variable is set.
    #[error("API key not found for backend '{backend}'. Set the {env_var} environment variable or api_key in [llm]")]
    ApiKeyNotFound { backend: String, env_var: String },

    /// Rejected by [`LlmConfig::validate`](crate::LlmConfig::validate).
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}
