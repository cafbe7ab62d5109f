//! Configuration system for Quarry.
//!
//! TOML configuration with three sections:
//! - `[llm]`: reasoning backend (provider, model, key source, retry knobs)
//! - `[runner]`: invocation timeout and reasoning iteration bound
//! - `[tools]`: HTTP, search provider and file access settings
//!
//! Files are layered: the user config (`$QUARRY_CONFIG_DIR/config.toml` or
//! the platform config dir) first, then a project-local `./quarry.toml`.
//! Fields set in a later layer win; CLI flags are applied by the caller.

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigSource, LoadedConfig, load_config_file, load_config_with_options, user_config_dir,
    user_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
