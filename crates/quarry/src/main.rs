//! Quarry - declarative multi-agent documentation pipelines
//!
//! Main entry point for the Quarry CLI.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;

mod commands;

use commands::{capabilities, config, run, validate};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Quarry - declarative multi-agent documentation pipelines
#[derive(Parser)]
#[command(name = "quarry")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// User config directory (default: platform config dir)
    #[arg(long, global = true, env = "QUARRY_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a pipeline definition
    Run(run::RunArgs),

    /// Check a pipeline definition without running it
    Validate(validate::ValidateArgs),

    /// List the capabilities pipelines can use
    Capabilities(capabilities::CapabilitiesArgs),

    /// Show the effective configuration
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging
// ─────────────────────────────────────────────────────────────────────────────

/// Console logs go to stderr so `--json` output stays clean. A JSON file
/// layer records everything under `<config dir>/logs`.
fn init_tracing(
    verbose: bool,
    log_dir: &Path,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let console_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if verbose {
            "quarry=debug,quarry_pipeline=debug,quarry_tools=debug,quarry_llm=debug,quarry_config=debug,info"
        } else {
            "quarry=info,quarry_pipeline=warn,quarry_tools=warn,quarry_llm=warn,warn"
        }
        .to_string()
    });

    let (file_layer, guard) = match RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("quarry")
        .filename_suffix("log")
        .build(log_dir)
    {
        Ok(appender) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "quarry=trace,quarry_pipeline=trace,quarry_tools=trace,quarry_llm=trace,quarry_config=trace,info",
                ));
            (Some(layer), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(console_filter)),
        )
        .with(file_layer)
        .init();

    guard
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_dir = cli.config_dir.clone().or_else(quarry_config::user_config_dir);
    let log_dir = config_dir
        .as_ref()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let _guard = init_tracing(cli.verbose, &log_dir);

    let loaded = quarry_config::load_config_with_options(None, config_dir.as_deref())?;
    for warning in &loaded.warnings {
        tracing::warn!("{}", warning);
    }
    tracing::debug!(sources = ?loaded.loaded_from(), "Configuration loaded");

    let ctx = commands::Context {
        json_output: cli.json,
        verbose: cli.verbose,
        loaded,
    };

    match cli.command {
        Commands::Run(args) => run::run(args, &ctx).await,
        Commands::Validate(args) => validate::run(args, &ctx).await,
        Commands::Capabilities(args) => capabilities::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}
