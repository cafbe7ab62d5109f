//! Config command - inspect configuration.

use anyhow::Result;
use clap::{Args, Subcommand};

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the merged configuration
    Show,

    /// Show which config files are loaded and their precedence
    Which,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Which => cmd_which(ctx),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let config = ctx.config();

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(());
    }

    println!("# Quarry Configuration\n");

    let sources = ctx.loaded.loaded_from();
    if sources.is_empty() {
        println!("No config files loaded (using defaults)\n");
    } else {
        println!("Config files:");
        for source in &sources {
            println!("  {}", source.display());
        }
        println!();
    }

    let llm = config.llm();
    let key_status = match llm.resolve_api_key() {
        Ok(Some(_)) => "key found",
        Ok(None) => "no key needed",
        Err(_) => "key missing",
    };
    println!("LLM:");
    println!(
        "  {} / {}  ({}, {})",
        llm.effective_backend(),
        llm.model.as_deref().unwrap_or("default model"),
        llm.api_key_env_var(),
        key_status
    );

    let runner = config.runner();
    println!("Runner:");
    println!("  invocation timeout: {}s", runner.effective_invocation_timeout_secs());
    println!("  max iterations:     {}", runner.effective_max_iterations());

    let tools = config.tools();
    println!("Tools:");
    println!(
        "  search: {}",
        tools.search.clone().unwrap_or_default().effective_provider()
    );
    if let Some(root) = &tools.file_root {
        println!("  file root: {}", root.display());
    }

    if !ctx.loaded.warnings.is_empty() {
        println!("\nWarnings:");
        for w in &ctx.loaded.warnings {
            println!("  ⚠ {}", w);
        }
    }

    if ctx.verbose {
        println!("\n---\nRaw config:\n");
        println!("{}", config.to_toml()?);
    }
    Ok(())
}

fn cmd_which(ctx: &Context) -> Result<()> {
    println!("Config file search order (later overrides earlier):\n");
    for source in &ctx.loaded.sources {
        let status = if source.loaded { "✓ loaded" } else { "· not found" };
        println!("  {} {}", status, source.path.display());
    }

    println!();
    match ctx.loaded.loaded_from().len() {
        0 => println!("No config files found."),
        n => println!("{} config file(s) loaded.", n),
    }
    Ok(())
}
